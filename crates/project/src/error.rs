//! Error taxonomy at the facade boundary. Path-scoped failures carry the
//! operation and the offending path; subsystem errors convert upward into
//! [`ProjectError`].

use keystorm_core::ConfigError;
use keystorm_graph::GraphError;
use keystorm_vfs::VfsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace is not open")]
    NotOpen,
    #[error("workspace is already open")]
    AlreadyOpen,
    #[error("workspace is closed")]
    Closed,
    #[error("workspace has no folders")]
    NoFolders,
    #[error("folder already in workspace: {0}")]
    FolderExists(String),
    #[error("folder not in workspace: {0}")]
    FolderNotFound(String),
    #[error("path is not in workspace: {0}")]
    NotInWorkspace(String),
    #[error("invalid workspace file: {0}")]
    InvalidWorkspaceFile(String),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not open: {0}")]
    NotOpen(String),
    #[error("document has unsaved changes: {0}")]
    Dirty(String),
    #[error("invalid edit range [{start}, {end}) for {len}-byte document")]
    InvalidEditRange { start: usize, end: usize, len: usize },
    #[error("file too large ({size} bytes, limit {limit}): {path}")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("binary file: {0}")]
    BinaryFile(String),
    #[error("document is read-only: {0}")]
    ReadOnly(String),
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project is not open")]
    NotOpen,
    #[error("project is already open")]
    AlreadyOpen,
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("{operation} {path}: {source}")]
    Document {
        operation: &'static str,
        path: String,
        #[source]
        source: DocumentError,
    },
    #[error("{operation} {path}: {source}")]
    Vfs {
        operation: &'static str,
        path: String,
        #[source]
        source: VfsError,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Build(#[from] keystorm_graph::BuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProjectError {
    pub(crate) fn document(operation: &'static str, path: &str, source: DocumentError) -> Self {
        ProjectError::Document { operation, path: path.to_string(), source }
    }

    pub(crate) fn vfs(operation: &'static str, path: &str, source: VfsError) -> Self {
        ProjectError::Vfs { operation, path: path.to_string(), source }
    }
}
