//! Shared conformance suite: the same operation script runs against the OS
//! backend (in a tempdir) and the in-memory backend (under `/`), and every
//! observable result must match — file bytes, listing order, walk order,
//! stat contents (mod file-system-dependent mode bits and timestamps), and
//! error kinds.

use keystorm_vfs::{path, DirEntry, FileInfo, MemFs, OsFs, Vfs, VfsErrorKind, WalkControl};

/// A backend plus the root all script paths are resolved against.
struct Harness {
    fs: Box<dyn Vfs>,
    root: String,
    _tmp: Option<tempfile::TempDir>,
}

impl Harness {
    fn os() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = path::normalize(tmp.path());
        Harness { fs: Box::new(OsFs::new()), root, _tmp: Some(tmp) }
    }

    fn mem() -> Self {
        Harness { fs: Box::new(MemFs::new()), root: "/ws".to_string(), _tmp: None }
    }

    fn abs(&self, rel: &str) -> String {
        path::join(&[&self.root, rel])
    }
}

/// Portable view of a stat record: root-relative path, name, size, kind.
fn portable(root: &str, info: &FileInfo) -> (String, String, u64, bool) {
    (path::rel(root, &info.path), info.name.clone(), info.size, info.is_dir)
}

fn run_script(h: &Harness) -> Vec<String> {
    let fs = h.fs.as_ref();
    let mut log = Vec::new();

    // MemFs starts without the scenario root; OsFs tempdir exists already.
    if !fs.exists(&h.root) {
        fs.mkdir_all(&h.root).unwrap();
    }

    // Build a small tree.
    fs.mkdir(&h.abs("src")).unwrap();
    fs.mkdir_all(&h.abs("deep/nested/dir")).unwrap();
    fs.write_file(&h.abs("src/main.go"), b"package main\n").unwrap();
    fs.write_file(&h.abs("src/util.go"), b"package main\n\nfunc util() {}\n").unwrap();
    fs.write_file(&h.abs("readme.md"), b"# readme\n").unwrap();

    // Streaming writer.
    {
        let mut w = fs.create(&h.abs("deep/out.bin")).unwrap();
        use std::io::Write;
        w.write_all(&[1, 2, 3]).unwrap();
        w.flush().unwrap();
    }

    // Reads.
    log.push(format!("read src/main.go = {:?}", fs.read_file(&h.abs("src/main.go")).unwrap()));
    log.push(format!("read deep/out.bin = {:?}", fs.read_file(&h.abs("deep/out.bin")).unwrap()));

    // Stat + read_dir.
    for entry in fs.read_dir(&h.root).unwrap() {
        log.push(format!("ls {:?}", portable(&h.root, &entry)));
    }
    log.push(format!("stat {:?}", portable(&h.root, &fs.stat(&h.abs("src/util.go")).unwrap())));

    // Predicates.
    log.push(format!(
        "exists={} is_dir={} is_regular={}",
        fs.exists(&h.abs("src")),
        fs.is_dir(&h.abs("src")),
        fs.is_regular(&h.abs("src/main.go")),
    ));

    // Rename file, then directory.
    fs.rename(&h.abs("readme.md"), &h.abs("README.md")).unwrap();
    fs.rename(&h.abs("deep"), &h.abs("moved")).unwrap();
    log.push(format!("after rename exists(readme.md)={}", fs.exists(&h.abs("readme.md"))));
    log.push(format!(
        "moved read = {:?}",
        fs.read_file(&h.abs("moved/out.bin")).unwrap()
    ));
    log.push(format!("moved subtree dir = {}", fs.is_dir(&h.abs("moved/nested/dir"))));

    // Walk order (portable paths).
    let mut walked = Vec::new();
    fs.walk(&h.root, &mut |info| {
        walked.push(path::rel(&h.root, &info.path));
        WalkControl::Continue
    })
    .unwrap();
    log.push(format!("walk {walked:?}"));

    // Walk with pruning.
    let mut pruned = Vec::new();
    fs.walk_dir(&h.root, &mut |entry: &DirEntry| {
        if entry.is_dir && entry.name == "moved" {
            return WalkControl::SkipDir;
        }
        pruned.push(path::rel(&h.root, &entry.path));
        WalkControl::Continue
    })
    .unwrap();
    log.push(format!("pruned {pruned:?}"));

    // Glob.
    let globbed: Vec<String> = fs
        .glob(&h.root, "**/*.go")
        .unwrap()
        .into_iter()
        .map(|p| path::rel(&h.root, &p))
        .collect();
    log.push(format!("glob {globbed:?}"));

    // Error kinds.
    log.push(format!("err {:?}", fs.read_file(&h.abs("missing")).unwrap_err().kind()));
    log.push(format!("err {:?}", fs.read_file(&h.abs("src")).unwrap_err().kind()));
    log.push(format!("err {:?}", fs.mkdir(&h.abs("src")).unwrap_err().kind()));
    log.push(format!("err {:?}", fs.mkdir(&h.abs("no/parent")).unwrap_err().kind()));
    log.push(format!("err {:?}", fs.remove(&h.abs("src")).unwrap_err().kind()));
    log.push(format!("err {:?}", fs.read_dir(&h.abs("src/main.go")).unwrap_err().kind()));

    // Removal.
    fs.remove(&h.abs("src/util.go")).unwrap();
    fs.remove_all(&h.abs("moved")).unwrap();
    fs.remove_all(&h.abs("never-existed")).unwrap();
    let mut remaining: Vec<String> = fs
        .read_dir(&h.root)
        .unwrap()
        .into_iter()
        .map(|fi| fi.name)
        .collect();
    remaining.sort();
    log.push(format!("remaining {remaining:?}"));

    log
}

#[test]
fn backends_agree_on_script() {
    let os_log = run_script(&Harness::os());
    let mem_log = run_script(&Harness::mem());
    assert_eq!(os_log, mem_log);
}

#[test]
fn read_buffers_are_independent_of_storage() {
    for h in [Harness::os(), Harness::mem()] {
        let fs = h.fs.as_ref();
        if !fs.exists(&h.root) {
            fs.mkdir_all(&h.root).unwrap();
        }
        let file = h.abs("buf.txt");
        let mut data = b"original".to_vec();
        fs.write_file(&file, &data).unwrap();

        // Mutating the input after write must not affect storage.
        data[0] = b'X';
        assert_eq!(fs.read_file(&file).unwrap(), b"original");

        // Mutating a read buffer must not affect storage.
        let mut out = fs.read_file(&file).unwrap();
        out[0] = b'Y';
        assert_eq!(fs.read_file(&file).unwrap(), b"original");
    }
}

#[test]
fn mkdir_all_rejects_file_component() {
    for h in [Harness::os(), Harness::mem()] {
        let fs = h.fs.as_ref();
        if !fs.exists(&h.root) {
            fs.mkdir_all(&h.root).unwrap();
        }
        fs.write_file(&h.abs("blocker"), b"").unwrap();
        let err = fs.mkdir_all(&h.abs("blocker/sub")).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NotDirectory, "backend disagrees");
    }
}
