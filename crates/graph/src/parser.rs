//! Language parsers: extension-keyed registry with a generic fallback, plus
//! the built-in Go-like parser that extracts package and import structure
//! with a line scanner.

use crate::model::{Edge, EdgeKind, EdgeMetadata, Node, NodeId};
use keystorm_vfs::path as vpath;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: String },
}

/// Nodes and edges one file contributes to the graph. Edges may reference
/// nodes produced by other files; the merge step resolves that.
#[derive(Debug, Default, Clone)]
pub struct ParseResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// One language family's structural extractor.
pub trait LanguageParser: Send + Sync {
    /// Language id this parser produces nodes for.
    fn language(&self) -> &'static str;

    /// File extensions (no dot) routed to this parser.
    fn extensions(&self) -> &'static [&'static str];

    fn parse(&self, path: &str, content: &[u8]) -> Result<ParseResult, ParseError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Extension-keyed parser lookup. Unknown extensions fall back to the
/// generic parser, which emits a bare file node.
pub struct ParserRegistry {
    by_extension: HashMap<&'static str, Arc<dyn LanguageParser>>,
    fallback: Arc<dyn LanguageParser>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        ParserRegistry { by_extension: HashMap::new(), fallback: Arc::new(GenericParser) }
    }

    /// Registry with every built-in parser installed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GoParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) {
        for ext in parser.extensions() {
            self.by_extension.insert(ext, Arc::clone(&parser));
        }
    }

    pub fn parser_for(&self, path: &str) -> Arc<dyn LanguageParser> {
        let ext = vpath::ext(path);
        self.by_extension
            .get(ext.as_str())
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ---------------------------------------------------------------------------
// Generic parser
// ---------------------------------------------------------------------------

/// Fallback for languages the core does not understand: a single file node,
/// no edges.
pub struct GenericParser;

impl LanguageParser for GenericParser {
    fn language(&self) -> &'static str {
        keystorm_core::PLAINTEXT
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn parse(&self, path: &str, content: &[u8]) -> Result<ParseResult, ParseError> {
        let mut node = Node::file(path);
        node.metadata.size = Some(content.len() as u64);
        Ok(ParseResult { nodes: vec![node], edges: Vec::new() })
    }
}

// ---------------------------------------------------------------------------
// Go-like parser
// ---------------------------------------------------------------------------

const GO_TEST_SUFFIX: &str = "_test.go";

fn go_package_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^package\s+(\w+)").unwrap())
}

fn go_import_single_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^import\s+(?:[\w.]+\s+)?"([^"]+)""#).unwrap())
}

fn go_import_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^(?:[\w.]+\s+)?"([^"]+)""#).unwrap())
}

/// Line scanner for Go-shaped source: the first `package NAME` declaration
/// and every `import "…"` path, in both single-line and block form.
///
/// Per file it emits the file node; a package node (keyed by directory) and
/// a `contains` edge once the package is known; an `import:<path>` node and
/// an `imports` edge per import; and for `_test.go` files a `tests` edge to
/// the conventional implementation path.
pub struct GoParser;

impl GoParser {
    pub fn new() -> Self {
        GoParser
    }
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for GoParser {
    fn language(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn parse(&self, path: &str, content: &[u8]) -> Result<ParseResult, ParseError> {
        let source = std::str::from_utf8(content)
            .map_err(|_| ParseError::NotUtf8 { path: path.to_string() })?;

        let mut package: Option<String> = None;
        let mut imports: Vec<String> = Vec::new();
        let mut in_import_block = false;

        for raw_line in source.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            if in_import_block {
                if line.starts_with(')') {
                    in_import_block = false;
                    continue;
                }
                if let Some(cap) = go_import_line_re().captures(line) {
                    imports.push(cap[1].to_string());
                }
                continue;
            }

            if package.is_none() {
                if let Some(cap) = go_package_re().captures(line) {
                    package = Some(cap[1].to_string());
                    continue;
                }
            }

            if line.starts_with("import (") || line == "import (" {
                in_import_block = true;
                continue;
            }
            if let Some(cap) = go_import_single_re().captures(line) {
                imports.push(cap[1].to_string());
            }
        }

        let mut result = ParseResult::default();
        let file_id = NodeId::file(path);

        let mut file_node = Node::file(path);
        file_node.metadata.size = Some(content.len() as u64);
        result.nodes.push(file_node);

        if let Some(pkg_name) = &package {
            let dir = vpath::dir(path);
            result.nodes.push(Node::package(&dir, pkg_name));
            result.edges.push(Edge::new(NodeId::package(&dir), file_id.clone(), EdgeKind::Contains));
        }

        imports.sort();
        imports.dedup();
        for import_path in &imports {
            result.nodes.push(Node::import(import_path));
            let mut edge = Edge::new(file_id.clone(), NodeId::import(import_path), EdgeKind::Imports);
            edge.metadata = EdgeMetadata { import_path: Some(import_path.clone()), ..Default::default() };
            result.edges.push(edge);
        }

        if let Some(impl_path) = test_impl_path(path) {
            if let Some(file_node) = result.nodes.first_mut() {
                file_node.metadata.test_target = Some(impl_path.clone());
            }
            result.edges.push(Edge::new(file_id, NodeId::file(&impl_path), EdgeKind::Tests));
        }

        Ok(result)
    }
}

/// `pkg/util_test.go` → `pkg/util.go`; `None` for non-test files.
pub fn test_impl_path(path: &str) -> Option<String> {
    let name = vpath::base(path);
    let stem = name.strip_suffix(GO_TEST_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    let dir = vpath::dir(path);
    Some(vpath::join(&[&dir, &format!("{stem}.go")]))
}

/// `pkg/util.go` → `pkg/util_test.go`; `None` when `path` is already a test
/// file or not a Go file.
pub fn impl_test_path(path: &str) -> Option<String> {
    let name = vpath::base(path);
    if name.ends_with(GO_TEST_SUFFIX) {
        return None;
    }
    let stem = name.strip_suffix(".go")?;
    let dir = vpath::dir(path);
    Some(vpath::join(&[&dir, &format!("{stem}{GO_TEST_SUFFIX}")]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    fn parse_go(path: &str, src: &str) -> ParseResult {
        GoParser::new().parse(path, src.as_bytes()).unwrap()
    }

    #[test]
    fn generic_emits_single_file_node() {
        let result = GenericParser.parse("/ws/notes.txt", b"hello").unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert!(result.edges.is_empty());
        assert_eq!(result.nodes[0].kind, NodeKind::File);
        assert_eq!(result.nodes[0].metadata.size, Some(5));
    }

    #[test]
    fn go_package_and_single_imports() {
        let src = r#"
package main

import "fmt"
import alias "strings"

func main() {}
"#;
        let result = parse_go("/ws/main.go", src);

        let pkg = result.nodes.iter().find(|n| n.kind == NodeKind::Package).unwrap();
        assert_eq!(pkg.name, "main");
        assert_eq!(pkg.id, NodeId::package("/ws"));

        let import_paths: Vec<&str> = result
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Imports)
            .filter_map(|e| e.metadata.import_path.as_deref())
            .collect();
        assert_eq!(import_paths, vec!["fmt", "strings"]);

        assert!(result
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::Contains && e.to == NodeId::file("/ws/main.go")));
    }

    #[test]
    fn go_import_block() {
        let src = r#"
package util

import (
	"fmt"
	"os"
	sub "example.com/dep/sub"
)
"#;
        let result = parse_go("/ws/util.go", src);
        let mut imports: Vec<String> = result
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Module)
            .map(|n| n.name.clone())
            .collect();
        imports.sort();
        assert_eq!(imports, vec!["example.com/dep/sub", "fmt", "os"]);
    }

    #[test]
    fn go_first_package_wins() {
        let src = "package one\n// package two in a comment\nvar x = 1\n";
        let result = parse_go("/ws/a.go", src);
        let pkg = result.nodes.iter().find(|n| n.kind == NodeKind::Package).unwrap();
        assert_eq!(pkg.name, "one");
    }

    #[test]
    fn go_file_without_package_has_no_contains_edge() {
        let result = parse_go("/ws/fragment.go", "// just a comment\n");
        assert!(result.edges.iter().all(|e| e.kind != EdgeKind::Contains));
        assert_eq!(result.nodes.len(), 1);
    }

    #[test]
    fn go_test_file_emits_tests_edge() {
        let src = "package util\n\nimport \"testing\"\n";
        let result = parse_go("/ws/util_test.go", src);
        let tests_edge = result.edges.iter().find(|e| e.kind == EdgeKind::Tests).unwrap();
        assert_eq!(tests_edge.from, NodeId::file("/ws/util_test.go"));
        assert_eq!(tests_edge.to, NodeId::file("/ws/util.go"));
    }

    #[test]
    fn go_duplicate_imports_collapse() {
        let src = "package a\nimport \"fmt\"\nimport \"fmt\"\n";
        let result = parse_go("/ws/a.go", src);
        let count = result.edges.iter().filter(|e| e.kind == EdgeKind::Imports).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn non_utf8_is_an_error() {
        let err = GoParser::new().parse("/ws/bad.go", &[0xFF, 0xFE, 0x00]).unwrap_err();
        assert!(matches!(err, ParseError::NotUtf8 { .. }));
    }

    #[test]
    fn naming_convention_swaps() {
        assert_eq!(test_impl_path("/ws/util_test.go"), Some("/ws/util.go".to_string()));
        assert_eq!(test_impl_path("/ws/util.go"), None);
        assert_eq!(test_impl_path("/ws/_test.go"), None);
        assert_eq!(impl_test_path("/ws/util.go"), Some("/ws/util_test.go".to_string()));
        assert_eq!(impl_test_path("/ws/util_test.go"), None);
        assert_eq!(impl_test_path("/ws/readme.md"), None);
    }

    #[test]
    fn registry_routes_by_extension() {
        let registry = ParserRegistry::with_builtins();
        assert_eq!(registry.parser_for("/ws/a.go").language(), "go");
        assert_eq!(registry.parser_for("/ws/a.py").language(), keystorm_core::PLAINTEXT);
    }
}
