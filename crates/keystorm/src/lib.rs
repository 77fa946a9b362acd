//! Keystorm workspace core — unified facade over the subsystem crates.
//!
//! Re-exports everything so consumers (shell, plugin host, language-server
//! front ends) depend on one crate with stable import paths.

pub use keystorm_core as core;
pub use keystorm_graph as graph;
pub use keystorm_project as project;
pub use keystorm_vfs as vfs;
pub use keystorm_watch as watch;

pub use keystorm_core::{CancelToken, Config, Encoding, IgnoreMatcher, LineEnding};
pub use keystorm_graph::ProjectGraph;
pub use keystorm_project::{Project, ProjectChangeEvent, ProjectError, ProjectOptions, Workspace};
pub use keystorm_vfs::{MemFs, OsFs, Vfs};
pub use keystorm_watch::{Debouncer, NativeWatcher, Watcher};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn facade_paths_resolve() {
        let fs = MemFs::new();
        fs.mkdir("/ws").unwrap();
        fs.write_file("/ws/readme.md", b"# hi\n").unwrap();

        let project = Project::new(Arc::new(fs));
        project
            .open(
                &["/ws"],
                ProjectOptions { enable_watcher: false, ..Default::default() },
            )
            .unwrap();
        assert!(project.is_open());
        assert_eq!(project.read_file("/ws/readme.md").unwrap(), b"# hi\n");
        project.close().unwrap();
    }
}
