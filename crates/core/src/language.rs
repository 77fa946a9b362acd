//! Extension to language-id mapping, shared by the document store and the
//! graph node helpers so both sides agree on what a path is.

use globset::{Glob, GlobMatcher};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

pub const PLAINTEXT: &str = "plaintext";

/// Builtin language id for a path, by extension (a few well-known basenames
/// are special-cased). Unknown extensions are [`PLAINTEXT`].
pub fn language_id_for_path(path: impl AsRef<Path>) -> &'static str {
    let path = path.as_ref();

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            "Dockerfile" => return "dockerfile",
            "Makefile" | "makefile" | "GNUmakefile" => return "makefile",
            "go.mod" => return "go.mod",
            "go.sum" => return "go.sum",
            _ => {}
        }
        if name.starts_with("Dockerfile.") {
            return "dockerfile";
        }
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("go") => "go",
        Some("rs") => "rust",
        Some("py") | Some("pyi") => "python",
        Some("js") | Some("mjs") | Some("cjs") => "javascript",
        Some("jsx") => "javascriptreact",
        Some("ts") => "typescript",
        Some("tsx") => "typescriptreact",
        Some("java") => "java",
        Some("kt") | Some("kts") => "kotlin",
        Some("c") | Some("h") => "c",
        Some("cpp") | Some("cc") | Some("cxx") | Some("hpp") | Some("hh") => "cpp",
        Some("cs") => "csharp",
        Some("rb") => "ruby",
        Some("php") => "php",
        Some("swift") => "swift",
        Some("sh") | Some("bash") | Some("zsh") => "shellscript",
        Some("ps1") | Some("psm1") => "powershell",
        Some("html") | Some("htm") => "html",
        Some("css") => "css",
        Some("scss") => "scss",
        Some("less") => "less",
        Some("json") | Some("jsonc") => "json",
        Some("yml") | Some("yaml") => "yaml",
        Some("toml") => "toml",
        Some("xml") => "xml",
        Some("md") | Some("markdown") => "markdown",
        Some("sql") => "sql",
        Some("proto") => "proto",
        Some("graphql") | Some("gql") => "graphql",
        Some("lua") => "lua",
        Some("vim") => "vim",
        Some("zig") => "zig",
        Some("txt") => PLAINTEXT,
        _ => PLAINTEXT,
    }
}

/// Builtin table layered under config-supplied glob associations.
///
/// Associations are compiled once; the first matching glob (in map order)
/// wins, otherwise the builtin table answers.
#[derive(Debug, Default)]
pub struct LanguageMap {
    associations: Vec<(GlobMatcher, String)>,
}

impl LanguageMap {
    pub fn new(associations: &BTreeMap<String, String>) -> Self {
        let mut compiled = Vec::with_capacity(associations.len());
        for (pattern, lang) in associations {
            match Glob::new(pattern) {
                Ok(glob) => compiled.push((glob.compile_matcher(), lang.clone())),
                Err(e) => {
                    warn!(pattern, error = %e, "skipping invalid language association glob")
                }
            }
        }
        LanguageMap { associations: compiled }
    }

    pub fn language_id(&self, path: impl AsRef<Path>) -> String {
        let path = path.as_ref();
        let name = path.file_name().map(Path::new).unwrap_or(path);
        for (matcher, lang) in &self.associations {
            if matcher.is_match(name) || matcher.is_match(path) {
                return lang.clone();
            }
        }
        language_id_for_path(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table() {
        assert_eq!(language_id_for_path("src/main.go"), "go");
        assert_eq!(language_id_for_path("lib.rs"), "rust");
        assert_eq!(language_id_for_path("a/b/app.tsx"), "typescriptreact");
        assert_eq!(language_id_for_path("Dockerfile"), "dockerfile");
        assert_eq!(language_id_for_path("Dockerfile.dev"), "dockerfile");
        assert_eq!(language_id_for_path("notes.unknown-ext"), PLAINTEXT);
        assert_eq!(language_id_for_path("no_extension"), PLAINTEXT);
    }

    #[test]
    fn associations_override_builtin() {
        let mut assoc = BTreeMap::new();
        assoc.insert("*.conf".to_string(), "ini".to_string());
        assoc.insert("*.rs".to_string(), "rust-custom".to_string());
        let map = LanguageMap::new(&assoc);

        assert_eq!(map.language_id("nginx.conf"), "ini");
        assert_eq!(map.language_id("src/lib.rs"), "rust-custom");
        assert_eq!(map.language_id("main.go"), "go");
    }

    #[test]
    fn invalid_glob_is_skipped() {
        let mut assoc = BTreeMap::new();
        assoc.insert("[".to_string(), "broken".to_string());
        let map = LanguageMap::new(&assoc);
        assert_eq!(map.language_id("anything.go"), "go");
    }
}
