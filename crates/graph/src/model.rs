//! Graph data model: typed nodes and edges with stable string identities.
//!
//! A node id is derived from its kind and a discriminator (`file:<absPath>`,
//! `pkg:<dir>`, `import:<importPath>`, …), so the same entity discovered
//! twice collides instead of duplicating. Edge identity is the
//! (from, to, kind) triple.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable node identity. Construct through the kind-specific helpers so the
/// prefix scheme stays uniform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn file(path: &str) -> Self {
        NodeId(format!("file:{path}"))
    }

    pub fn dir(path: &str) -> Self {
        NodeId(format!("dir:{path}"))
    }

    pub fn module(module_path: &str) -> Self {
        NodeId(format!("module:{module_path}"))
    }

    pub fn package(dir: &str) -> Self {
        NodeId(format!("pkg:{dir}"))
    }

    pub fn function(file: &str, name: &str) -> Self {
        NodeId(format!("func:{file}:{name}"))
    }

    pub fn test(path: &str) -> Self {
        NodeId(format!("test:{path}"))
    }

    pub fn import(import_path: &str) -> Self {
        NodeId(format!("import:{import_path}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
    Module,
    Package,
    Class,
    Function,
    Test,
    Config,
    Api,
    Schema,
}

/// Typed metadata; unused fields stay absent in the save format.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_target: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeMetadata {
    pub fn is_empty(&self) -> bool {
        self == &NodeMetadata::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "NodeMetadata::is_empty")]
    pub metadata: NodeMetadata,
}

impl Node {
    /// File node with its id and name derived from the path.
    pub fn file(path: &str) -> Self {
        Node {
            id: NodeId::file(path),
            kind: NodeKind::File,
            path: Some(path.to_string()),
            name: keystorm_vfs::path::base(path),
            language: Some(keystorm_core::language_id_for_path(path).to_string()),
            metadata: NodeMetadata::default(),
        }
    }

    pub fn directory(path: &str) -> Self {
        Node {
            id: NodeId::dir(path),
            kind: NodeKind::Directory,
            path: Some(path.to_string()),
            name: keystorm_vfs::path::base(path),
            language: None,
            metadata: NodeMetadata::default(),
        }
    }

    pub fn package(dir: &str, name: &str) -> Self {
        Node {
            id: NodeId::package(dir),
            kind: NodeKind::Package,
            path: Some(dir.to_string()),
            name: name.to_string(),
            language: None,
            metadata: NodeMetadata::default(),
        }
    }

    pub fn import(import_path: &str) -> Self {
        Node {
            id: NodeId::import(import_path),
            kind: NodeKind::Module,
            path: None,
            name: import_path.to_string(),
            language: None,
            metadata: NodeMetadata { module_path: Some(import_path.to_string()), ..Default::default() },
        }
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Imports,
    Exports,
    Calls,
    Extends,
    Implements,
    Tests,
    Contains,
    DependsOn,
    References,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EdgeMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imported_symbols: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub call_sites: Vec<CallSite>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EdgeMetadata {
    pub fn is_empty(&self) -> bool {
        self == &EdgeMetadata::default()
    }
}

pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

fn default_weight() -> f64 {
    DEFAULT_EDGE_WEIGHT
}

fn is_default_weight(w: &f64) -> bool {
    *w == DEFAULT_EDGE_WEIGHT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    #[serde(default = "default_weight", skip_serializing_if = "is_default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "EdgeMetadata::is_empty")]
    pub metadata: EdgeMetadata,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        Edge { from, to, kind, weight: DEFAULT_EDGE_WEIGHT, metadata: EdgeMetadata::default() }
    }

    /// Same identity triple as another edge.
    pub fn same_triple(&self, other: &Edge) -> bool {
        self.from == other.from && self.to == other.to && self.kind == other.kind
    }
}
