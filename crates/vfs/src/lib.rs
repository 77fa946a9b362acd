//! Virtual file system behind one trait, with an OS backend and an
//! in-memory backend that behave identically.
//!
//! All paths are forward-slash strings; [`path`] has the lexical helpers.
//! Backends must satisfy the same contracts — the shared conformance suite
//! in `tests/conformance.rs` runs one operation script against both and
//! compares results byte for byte.

use std::io::{Read, Write};
use std::time::SystemTime;
use thiserror::Error;

pub mod mem;
pub mod os;
pub mod path;

pub use mem::MemFs;
pub use os::OsFs;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Classified failure kind, stable across backends so callers can map VFS
/// errors into their own domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfsErrorKind {
    NotFound,
    IsDirectory,
    NotDirectory,
    NotEmpty,
    AlreadyExists,
    InvalidPath,
    Io,
}

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("path is a directory: {0}")]
    IsDirectory(String),
    #[error("path is not a directory: {0}")]
    NotDirectory(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("path already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VfsError {
    pub fn kind(&self) -> VfsErrorKind {
        match self {
            VfsError::NotFound(_) => VfsErrorKind::NotFound,
            VfsError::IsDirectory(_) => VfsErrorKind::IsDirectory,
            VfsError::NotDirectory(_) => VfsErrorKind::NotDirectory,
            VfsError::NotEmpty(_) => VfsErrorKind::NotEmpty,
            VfsError::AlreadyExists(_) => VfsErrorKind::AlreadyExists,
            VfsError::InvalidPath(_) => VfsErrorKind::InvalidPath,
            VfsError::Io { .. } => VfsErrorKind::Io,
        }
    }

    /// Path the error is about.
    pub fn path(&self) -> &str {
        match self {
            VfsError::NotFound(p)
            | VfsError::IsDirectory(p)
            | VfsError::NotDirectory(p)
            | VfsError::NotEmpty(p)
            | VfsError::AlreadyExists(p)
            | VfsError::InvalidPath(p) => p,
            VfsError::Io { path, .. } => path,
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Stat record, identical in content across backends for equivalent files
/// (mode bits may differ per filesystem).
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    /// Cleaned absolute path.
    pub path: String,
    /// Final path component.
    pub name: String,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Unix-style permission bits.
    pub mode: u32,
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// Lightweight entry handed to [`Vfs::walk_dir`] callbacks; avoids a stat
/// per visited path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
}

/// Control value returned by walk callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    /// Prune the subtree below the current directory.
    SkipDir,
    /// End the walk early with success.
    Stop,
}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// Unified file-system surface. Implementations are thread-safe and hand out
/// fresh buffers: a `read_file` result may be mutated freely, and
/// `write_file` copies its input before storing.
pub trait Vfs: Send + Sync {
    /// Read an entire file into a fresh buffer.
    fn read_file(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Write a file, creating it or truncating an existing one. The parent
    /// directory must exist.
    fn write_file(&self, path: &str, data: &[u8]) -> VfsResult<()>;

    /// Open a file for streaming reads.
    fn open(&self, path: &str) -> VfsResult<Box<dyn Read + Send>>;

    /// Create a file and return a streaming writer. Content becomes visible
    /// when the writer is flushed or dropped.
    fn create(&self, path: &str) -> VfsResult<Box<dyn Write + Send>>;

    fn stat(&self, path: &str) -> VfsResult<FileInfo>;

    /// Directory entries sorted by name.
    fn read_dir(&self, path: &str) -> VfsResult<Vec<FileInfo>>;

    /// Create one directory. Fails when the target exists or the parent is
    /// missing.
    fn mkdir(&self, path: &str) -> VfsResult<()>;

    /// Create a directory and every missing intermediate. Fails when a
    /// component exists as a non-directory.
    fn mkdir_all(&self, path: &str) -> VfsResult<()>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> VfsResult<()>;

    /// Remove a path and all descendants. Succeeds when the path is missing.
    fn remove_all(&self, path: &str) -> VfsResult<()>;

    /// Rename a file or directory. Directory renames move all descendants.
    fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    fn is_dir(&self, path: &str) -> bool {
        self.stat(path).map(|fi| fi.is_dir).unwrap_or(false)
    }

    fn is_regular(&self, path: &str) -> bool {
        self.stat(path).map(|fi| !fi.is_dir).unwrap_or(false)
    }

    /// Pre-order walk with full stat records: the root first, then each
    /// directory before its children, entries sorted by name. Returning
    /// [`WalkControl::SkipDir`] from a directory visit prunes its subtree.
    fn walk(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&FileInfo) -> WalkControl,
    ) -> VfsResult<()> {
        let info = self.stat(&path::clean(root))?;
        walk_rec(self, &info, visit).map(|_| ())
    }

    /// Pre-order walk with lightweight entries. Same pruning rules as
    /// [`walk`](Self::walk).
    fn walk_dir(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&DirEntry) -> WalkControl,
    ) -> VfsResult<()> {
        let mut adapter = |info: &FileInfo| {
            visit(&DirEntry {
                path: info.path.clone(),
                name: info.name.clone(),
                is_dir: info.is_dir,
            })
        };
        let info = self.stat(&path::clean(root))?;
        walk_rec(self, &info, &mut adapter).map(|_| ())
    }

    /// File paths under `base` whose base-relative form matches `pattern`
    /// (gitignore-style glob, `**` allowed). Sorted.
    fn glob(&self, base: &str, pattern: &str) -> VfsResult<Vec<String>> {
        let matcher = globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|_| VfsError::InvalidPath(pattern.to_string()))?
            .compile_matcher();

        let base_clean = path::clean(base);
        let mut out = Vec::new();
        self.walk_dir(&base_clean, &mut |entry| {
            if !entry.is_dir {
                let rel = path::rel(&base_clean, &entry.path);
                if matcher.is_match(&rel) {
                    out.push(entry.path.clone());
                }
            }
            WalkControl::Continue
        })?;
        out.sort();
        Ok(out)
    }
}

fn walk_rec<V: Vfs + ?Sized>(
    vfs: &V,
    info: &FileInfo,
    visit: &mut dyn FnMut(&FileInfo) -> WalkControl,
) -> VfsResult<WalkControl> {
    match visit(info) {
        WalkControl::Stop => return Ok(WalkControl::Stop),
        WalkControl::SkipDir => return Ok(WalkControl::Continue),
        WalkControl::Continue => {}
    }
    if info.is_dir {
        for entry in vfs.read_dir(&info.path)? {
            if walk_rec(vfs, &entry, visit)? == WalkControl::Stop {
                return Ok(WalkControl::Stop);
            }
        }
    }
    Ok(WalkControl::Continue)
}
