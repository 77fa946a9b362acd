//! Keystorm Project — the workspace core's facade layer: the multi-root
//! workspace model, the open-document store, index collaborators, and the
//! [`Project`] handle that ties every subsystem together.

pub mod document;
pub mod error;
pub mod events;
pub mod index;
pub mod project;
pub mod workspace;

pub use document::{Document, DocumentStore, StoreOptions};
pub use error::{DocumentError, ProjectError, WorkspaceError};
pub use events::{ObserverId, ObserverRegistry, ProjectChangeEvent, ProjectEventKind};
pub use index::{
    ContentHit, ContentIndex, FileChangeEvent, FileChangeKind, FileIndex, InMemoryContentIndex,
    InMemoryFileIndex, IncrementalIndexer, IndexerDeps,
};
pub use project::{Project, ProjectOptions};
pub use workspace::{
    load_folder_config, Folder, FolderEntry, Workspace, WorkspaceChangeEvent, WorkspaceChangeKind,
    WorkspaceFile, WORKSPACE_CONFIG_PATH,
};
