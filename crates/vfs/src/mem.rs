//! In-memory backend: a flat map of cleaned absolute paths to nodes behind a
//! reader-writer lock, so concurrent readers never block each other.
//!
//! Paths are normalized to leading-slash absolute form on entry; the root
//! directory `/` always exists.

use crate::{path, FileInfo, Vfs, VfsError, VfsResult};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone)]
enum MemNode {
    File { data: Vec<u8>, modified: SystemTime },
    Dir { modified: SystemTime },
}

impl MemNode {
    fn is_dir(&self) -> bool {
        matches!(self, MemNode::Dir { .. })
    }

    fn file(data: Vec<u8>) -> Self {
        MemNode::File { data, modified: SystemTime::now() }
    }

    fn dir() -> Self {
        MemNode::Dir { modified: SystemTime::now() }
    }
}

type Nodes = BTreeMap<String, MemNode>;

/// Thread-safe in-memory file system. Cloning shares the same tree.
#[derive(Debug, Clone)]
pub struct MemFs {
    nodes: Arc<RwLock<Nodes>>,
}

impl MemFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), MemNode::dir());
        MemFs { nodes: Arc::new(RwLock::new(nodes)) }
    }

    /// Normalize to the internal leading-slash cleaned form.
    fn norm(p: &str) -> String {
        if p.starts_with('/') {
            path::clean(p)
        } else {
            path::clean(&format!("/{p}"))
        }
    }

    fn info(key: &str, node: &MemNode) -> FileInfo {
        match node {
            MemNode::File { data, modified } => FileInfo {
                path: key.to_string(),
                name: path::base(key),
                size: data.len() as u64,
                mode: FILE_MODE,
                modified: *modified,
                is_dir: false,
            },
            MemNode::Dir { modified } => FileInfo {
                path: key.to_string(),
                name: path::base(key),
                size: 0,
                mode: DIR_MODE,
                modified: *modified,
                is_dir: true,
            },
        }
    }

    /// Parent must exist and be a directory for any node creation.
    fn check_parent(nodes: &Nodes, key: &str) -> VfsResult<()> {
        let parent = path::dir(key);
        match nodes.get(&parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(VfsError::NotDirectory(parent)),
            None => Err(VfsError::NotFound(parent)),
        }
    }

    /// Direct children of `key`, assuming `key` names an existing directory.
    fn children<'a>(nodes: &'a Nodes, key: &str) -> Vec<(&'a String, &'a MemNode)> {
        let prefix = if key == "/" { "/".to_string() } else { format!("{key}/") };
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.len() > prefix.len())
            .filter(|(k, _)| !k[prefix.len()..].contains('/'))
            .collect()
    }

    fn has_children(nodes: &Nodes, key: &str) -> bool {
        let prefix = if key == "/" { "/".to_string() } else { format!("{key}/") };
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .any(|(k, _)| k.len() > prefix.len())
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for MemFs {
    fn read_file(&self, p: &str) -> VfsResult<Vec<u8>> {
        let key = Self::norm(p);
        let nodes = self.nodes.read().unwrap();
        match nodes.get(&key) {
            Some(MemNode::File { data, .. }) => Ok(data.clone()),
            Some(MemNode::Dir { .. }) => Err(VfsError::IsDirectory(key)),
            None => Err(VfsError::NotFound(key)),
        }
    }

    fn write_file(&self, p: &str, data: &[u8]) -> VfsResult<()> {
        let key = Self::norm(p);
        let mut nodes = self.nodes.write().unwrap();
        if nodes.get(&key).is_some_and(MemNode::is_dir) {
            return Err(VfsError::IsDirectory(key));
        }
        Self::check_parent(&nodes, &key)?;
        nodes.insert(key, MemNode::file(data.to_vec()));
        Ok(())
    }

    fn open(&self, p: &str) -> VfsResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read_file(p)?)))
    }

    fn create(&self, p: &str) -> VfsResult<Box<dyn Write + Send>> {
        let key = Self::norm(p);
        {
            let mut nodes = self.nodes.write().unwrap();
            if nodes.get(&key).is_some_and(MemNode::is_dir) {
                return Err(VfsError::IsDirectory(key));
            }
            Self::check_parent(&nodes, &key)?;
            nodes.insert(key.clone(), MemNode::file(Vec::new()));
        }
        Ok(Box::new(MemWriter { nodes: Arc::clone(&self.nodes), key, buf: Vec::new() }))
    }

    fn stat(&self, p: &str) -> VfsResult<FileInfo> {
        let key = Self::norm(p);
        let nodes = self.nodes.read().unwrap();
        nodes
            .get(&key)
            .map(|n| Self::info(&key, n))
            .ok_or(VfsError::NotFound(key))
    }

    fn read_dir(&self, p: &str) -> VfsResult<Vec<FileInfo>> {
        let key = Self::norm(p);
        let nodes = self.nodes.read().unwrap();
        match nodes.get(&key) {
            Some(MemNode::Dir { .. }) => {}
            Some(_) => return Err(VfsError::NotDirectory(key)),
            None => return Err(VfsError::NotFound(key)),
        }
        // BTreeMap iteration is already name-sorted.
        Ok(Self::children(&nodes, &key)
            .into_iter()
            .map(|(k, n)| Self::info(k, n))
            .collect())
    }

    fn mkdir(&self, p: &str) -> VfsResult<()> {
        let key = Self::norm(p);
        let mut nodes = self.nodes.write().unwrap();
        if nodes.contains_key(&key) {
            return Err(VfsError::AlreadyExists(key));
        }
        Self::check_parent(&nodes, &key)?;
        nodes.insert(key, MemNode::dir());
        Ok(())
    }

    fn mkdir_all(&self, p: &str) -> VfsResult<()> {
        let key = Self::norm(p);
        let mut nodes = self.nodes.write().unwrap();
        let mut partial = String::new();
        for comp in key.split('/').filter(|c| !c.is_empty()) {
            partial.push('/');
            partial.push_str(comp);
            match nodes.get(&partial) {
                Some(node) if node.is_dir() => {}
                Some(_) => return Err(VfsError::NotDirectory(partial)),
                None => {
                    nodes.insert(partial.clone(), MemNode::dir());
                }
            }
        }
        Ok(())
    }

    fn remove(&self, p: &str) -> VfsResult<()> {
        let key = Self::norm(p);
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get(&key) {
            Some(MemNode::Dir { .. }) if Self::has_children(&nodes, &key) => {
                return Err(VfsError::NotEmpty(key));
            }
            Some(_) => {}
            None => return Err(VfsError::NotFound(key)),
        }
        nodes.remove(&key);
        Ok(())
    }

    fn remove_all(&self, p: &str) -> VfsResult<()> {
        let key = Self::norm(p);
        let mut nodes = self.nodes.write().unwrap();
        let prefix = if key == "/" { "/".to_string() } else { format!("{key}/") };
        let doomed: Vec<String> = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.as_str() != "/")
            .map(|(k, _)| k.clone())
            .collect();
        for k in doomed {
            nodes.remove(&k);
        }
        if key != "/" {
            nodes.remove(&key);
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_key = Self::norm(from);
        let to_key = Self::norm(to);
        if from_key == to_key {
            return Ok(());
        }
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes.get(&from_key).cloned().ok_or_else(|| VfsError::NotFound(from_key.clone()))?;
        Self::check_parent(&nodes, &to_key)?;

        if node.is_dir() {
            if nodes.contains_key(&to_key) {
                return Err(VfsError::AlreadyExists(to_key));
            }
            if path::is_ancestor_or_equal(&from_key, &to_key) {
                return Err(VfsError::InvalidPath(to_key));
            }
            let prefix = format!("{from_key}/");
            let descendants: Vec<String> = nodes
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| k.clone())
                .collect();
            for old in descendants {
                let new = format!("{to_key}/{}", &old[prefix.len()..]);
                let moved = nodes.remove(&old).unwrap();
                nodes.insert(new, moved);
            }
        } else if nodes.get(&to_key).is_some_and(MemNode::is_dir) {
            return Err(VfsError::IsDirectory(to_key));
        }

        nodes.remove(&from_key);
        nodes.insert(to_key, node);
        Ok(())
    }
}

/// Streaming writer that commits its buffer on flush and on drop.
struct MemWriter {
    nodes: Arc<RwLock<Nodes>>,
    key: String,
    buf: Vec<u8>,
}

impl MemWriter {
    fn commit(&mut self) {
        let mut nodes = self.nodes.write().unwrap();
        nodes.insert(self.key.clone(), MemNode::file(self.buf.clone()));
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        self.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WalkControl;

    fn fs_with(paths: &[(&str, &str)]) -> MemFs {
        let fs = MemFs::new();
        for (p, content) in paths {
            fs.mkdir_all(&path::dir(p)).unwrap();
            fs.write_file(p, content.as_bytes()).unwrap();
        }
        fs
    }

    #[test]
    fn read_returns_fresh_buffer() {
        let fs = fs_with(&[("/ws/a.txt", "hello")]);
        let mut buf = fs.read_file("/ws/a.txt").unwrap();
        buf[0] = b'H';
        assert_eq!(fs.read_file("/ws/a.txt").unwrap(), b"hello");
    }

    #[test]
    fn write_requires_parent() {
        let fs = MemFs::new();
        let err = fs.write_file("/missing/a.txt", b"x").unwrap_err();
        assert_eq!(err.kind(), crate::VfsErrorKind::NotFound);
    }

    #[test]
    fn relative_paths_are_rooted() {
        let fs = MemFs::new();
        fs.mkdir("ws").unwrap();
        assert!(fs.is_dir("/ws"));
    }

    #[test]
    fn mkdir_errors() {
        let fs = MemFs::new();
        fs.mkdir("/a").unwrap();
        assert_eq!(fs.mkdir("/a").unwrap_err().kind(), crate::VfsErrorKind::AlreadyExists);
        assert_eq!(fs.mkdir("/x/y").unwrap_err().kind(), crate::VfsErrorKind::NotFound);

        fs.write_file("/a/file", b"").unwrap();
        assert_eq!(
            fs.mkdir_all("/a/file/sub").unwrap_err().kind(),
            crate::VfsErrorKind::NotDirectory
        );
    }

    #[test]
    fn remove_semantics() {
        let fs = fs_with(&[("/d/inner.txt", "x")]);
        assert_eq!(fs.remove("/d").unwrap_err().kind(), crate::VfsErrorKind::NotEmpty);
        fs.remove("/d/inner.txt").unwrap();
        fs.remove("/d").unwrap();
        assert!(!fs.exists("/d"));

        // remove_all tolerates missing paths
        fs.remove_all("/never/was").unwrap();
    }

    #[test]
    fn rename_moves_directory_tree() {
        let fs = fs_with(&[("/old/a.txt", "a"), ("/old/sub/b.txt", "b")]);
        fs.rename("/old", "/new").unwrap();
        assert!(!fs.exists("/old"));
        assert_eq!(fs.read_file("/new/a.txt").unwrap(), b"a");
        assert_eq!(fs.read_file("/new/sub/b.txt").unwrap(), b"b");
    }

    #[test]
    fn rename_into_own_subtree_fails() {
        let fs = MemFs::new();
        fs.mkdir_all("/a/b").unwrap();
        assert!(fs.rename("/a", "/a/b/c").is_err());
    }

    #[test]
    fn rename_overwrites_file_target() {
        let fs = fs_with(&[("/a.txt", "new"), ("/b.txt", "old")]);
        fs.rename("/a.txt", "/b.txt").unwrap();
        assert_eq!(fs.read_file("/b.txt").unwrap(), b"new");
        assert!(!fs.exists("/a.txt"));
    }

    #[test]
    fn read_dir_sorted() {
        let fs = fs_with(&[("/d/c.txt", ""), ("/d/a.txt", ""), ("/d/b.txt", "")]);
        let names: Vec<String> =
            fs.read_dir("/d").unwrap().into_iter().map(|fi| fi.name).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn streaming_writer_commits_on_drop() {
        let fs = MemFs::new();
        {
            let mut w = fs.create("/out.txt").unwrap();
            w.write_all(b"part one, ").unwrap();
            w.write_all(b"part two").unwrap();
        }
        assert_eq!(fs.read_file("/out.txt").unwrap(), b"part one, part two");
    }

    #[test]
    fn walk_skip_dir_prunes() {
        let fs = fs_with(&[
            ("/ws/src/main.go", ""),
            ("/ws/vendor/dep.go", ""),
            ("/ws/readme.md", ""),
        ]);
        let mut seen = Vec::new();
        fs.walk("/ws", &mut |info| {
            if info.is_dir && info.name == "vendor" {
                return WalkControl::SkipDir;
            }
            seen.push(info.path.clone());
            WalkControl::Continue
        })
        .unwrap();
        assert!(seen.contains(&"/ws/src/main.go".to_string()));
        assert!(seen.contains(&"/ws/readme.md".to_string()));
        assert!(!seen.iter().any(|p| p.contains("vendor")));
    }

    #[test]
    fn glob_matches_relative_pattern() {
        let fs = fs_with(&[
            ("/ws/a.go", ""),
            ("/ws/sub/b.go", ""),
            ("/ws/sub/c.txt", ""),
        ]);
        assert_eq!(fs.glob("/ws", "*.go").unwrap(), vec!["/ws/a.go"]);
        assert_eq!(
            fs.glob("/ws", "**/*.go").unwrap(),
            vec!["/ws/a.go", "/ws/sub/b.go"]
        );
    }
}
