//! OS-backed implementation over `std::fs`, translating `io::ErrorKind` into
//! the typed VFS error kinds so both backends fail identically.

use crate::{path, FileInfo, Vfs, VfsError, VfsResult};
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::SystemTime;

/// The real filesystem. Stateless; safe to share and clone.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl OsFs {
    pub fn new() -> Self {
        OsFs
    }

    fn map_err(p: &str, e: std::io::Error) -> VfsError {
        use std::io::ErrorKind;
        let path = p.to_string();
        match e.kind() {
            ErrorKind::NotFound => VfsError::NotFound(path),
            ErrorKind::AlreadyExists => VfsError::AlreadyExists(path),
            ErrorKind::IsADirectory => VfsError::IsDirectory(path),
            ErrorKind::NotADirectory => VfsError::NotDirectory(path),
            ErrorKind::DirectoryNotEmpty => VfsError::NotEmpty(path),
            ErrorKind::InvalidInput => VfsError::InvalidPath(path),
            _ => VfsError::Io { path, source: e },
        }
    }

    fn info_from_meta(p: &str, meta: &fs::Metadata) -> FileInfo {
        FileInfo {
            path: p.to_string(),
            name: path::base(p),
            size: if meta.is_dir() { 0 } else { meta.len() },
            mode: meta.permissions().mode() & 0o7777,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir: meta.is_dir(),
        }
    }
}

impl Vfs for OsFs {
    fn read_file(&self, p: &str) -> VfsResult<Vec<u8>> {
        // fs::read maps a directory read to Io on some platforms; stat first
        // for a stable kind.
        let meta = fs::metadata(p).map_err(|e| Self::map_err(p, e))?;
        if meta.is_dir() {
            return Err(VfsError::IsDirectory(p.to_string()));
        }
        fs::read(p).map_err(|e| Self::map_err(p, e))
    }

    fn write_file(&self, p: &str, data: &[u8]) -> VfsResult<()> {
        if Path::new(p).is_dir() {
            return Err(VfsError::IsDirectory(p.to_string()));
        }
        fs::write(p, data).map_err(|e| Self::map_err(p, e))
    }

    fn open(&self, p: &str) -> VfsResult<Box<dyn Read + Send>> {
        let meta = fs::metadata(p).map_err(|e| Self::map_err(p, e))?;
        if meta.is_dir() {
            return Err(VfsError::IsDirectory(p.to_string()));
        }
        let file = fs::File::open(p).map_err(|e| Self::map_err(p, e))?;
        Ok(Box::new(file))
    }

    fn create(&self, p: &str) -> VfsResult<Box<dyn Write + Send>> {
        if Path::new(p).is_dir() {
            return Err(VfsError::IsDirectory(p.to_string()));
        }
        let file = fs::File::create(p).map_err(|e| Self::map_err(p, e))?;
        Ok(Box::new(file))
    }

    fn stat(&self, p: &str) -> VfsResult<FileInfo> {
        let cleaned = path::clean(p);
        let meta = fs::metadata(&cleaned).map_err(|e| Self::map_err(&cleaned, e))?;
        Ok(Self::info_from_meta(&cleaned, &meta))
    }

    fn read_dir(&self, p: &str) -> VfsResult<Vec<FileInfo>> {
        let cleaned = path::clean(p);
        let meta = fs::metadata(&cleaned).map_err(|e| Self::map_err(&cleaned, e))?;
        if !meta.is_dir() {
            return Err(VfsError::NotDirectory(cleaned));
        }
        let mut entries = Vec::new();
        let iter = fs::read_dir(&cleaned).map_err(|e| Self::map_err(&cleaned, e))?;
        for entry in iter {
            let entry = entry.map_err(|e| Self::map_err(&cleaned, e))?;
            let child = path::join(&[&cleaned, &entry.file_name().to_string_lossy()]);
            let meta = entry.metadata().map_err(|e| Self::map_err(&child, e))?;
            entries.push(Self::info_from_meta(&child, &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&self, p: &str) -> VfsResult<()> {
        fs::create_dir(p).map_err(|e| Self::map_err(p, e))
    }

    fn mkdir_all(&self, p: &str) -> VfsResult<()> {
        fs::create_dir_all(p).map_err(|e| Self::map_err(p, e))
    }

    fn remove(&self, p: &str) -> VfsResult<()> {
        let meta = fs::metadata(p).map_err(|e| Self::map_err(p, e))?;
        if meta.is_dir() {
            fs::remove_dir(p).map_err(|e| Self::map_err(p, e))
        } else {
            fs::remove_file(p).map_err(|e| Self::map_err(p, e))
        }
    }

    fn remove_all(&self, p: &str) -> VfsResult<()> {
        match fs::remove_dir_all(p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => {
                fs::remove_file(p).map_err(|e| Self::map_err(p, e))
            }
            Err(e) => Err(Self::map_err(p, e)),
        }
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        if !Path::new(from).exists() {
            return Err(VfsError::NotFound(from.to_string()));
        }
        fs::rename(from, to).map_err(|e| Self::map_err(to, e))
    }
}
