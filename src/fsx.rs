//! Filesystem capability layer.
//!
//! The archive engine never touches `std::fs` directly. It goes through
//! [`FileSystem`], which exposes the handful of capabilities the engine
//! needs: classify a path, enumerate a tree, read a file, write a file and
//! create a directory. [`LocalFs`] is the real implementation; tests wrap it
//! to observe the order of operations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// What a path refers to on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    /// Symlinks, sockets, devices. Not archived.
    Other,
}

/// One node produced by [`FileSystem::enumerate`].
#[derive(Debug, Clone)]
pub struct FsNode {
    pub path: PathBuf,
    pub kind: NodeKind,
}

pub type NodeIter<'a> = Box<dyn Iterator<Item = io::Result<FsNode>> + 'a>;

pub trait FileSystem: Send + Sync {
    /// `Ok(None)` when nothing exists at `path`. Symlinks are not followed.
    fn kind(&self, path: &Path) -> io::Result<Option<NodeKind>>;

    /// Every node below `root` (excluding `root` itself), depth-first, each
    /// directory before its contents, siblings ordered by file name.
    fn enumerate<'a>(&'a self, root: &Path) -> NodeIter<'a>;

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Creates or truncates `path`. The parent directory must already exist.
    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// The local disk, via `std::fs` and `walkdir`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

fn classify(file_type: fs::FileType) -> NodeKind {
    if file_type.is_dir() {
        NodeKind::Directory
    } else if file_type.is_file() {
        NodeKind::File
    } else {
        NodeKind::Other
    }
}

impl FileSystem for LocalFs {
    fn kind(&self, path: &Path) -> io::Result<Option<NodeKind>> {
        match fs::symlink_metadata(path) {
            Ok(meta) => Ok(Some(classify(meta.file_type()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn enumerate<'a>(&'a self, root: &Path) -> NodeIter<'a> {
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| {
                let entry = entry.map_err(io::Error::from)?;
                Ok(FsNode { kind: classify(entry.file_type()), path: entry.into_path() })
            });
        Box::new(walker)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn enumerate_is_sorted_depth_first() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("b/inner"))?;
        fs::create_dir(dir.path().join("a"))?;
        fs::write(dir.path().join("b/inner/z.txt"), b"z")?;
        fs::write(dir.path().join("b/c.txt"), b"c")?;
        fs::write(dir.path().join("a.txt"), b"a")?;

        let fs = LocalFs;
        let seen: Vec<String> = fs
            .enumerate(dir.path())
            .map(|node| node.map(|n| n.path.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/")))
            .collect::<io::Result<_>>()?;

        assert_eq!(seen, vec!["a", "a.txt", "b", "b/c.txt", "b/inner", "b/inner/z.txt"]);
        Ok(())
    }

    #[test]
    fn kind_reports_missing_paths() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("f"), b"")?;
        assert_eq!(LocalFs.kind(dir.path())?, Some(NodeKind::Directory));
        assert_eq!(LocalFs.kind(&dir.path().join("f"))?, Some(NodeKind::File));
        assert_eq!(LocalFs.kind(&dir.path().join("missing"))?, None);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_other() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("target"), b"t")?;
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link"))?;
        assert_eq!(LocalFs.kind(&dir.path().join("link"))?, Some(NodeKind::Other));
        Ok(())
    }
}
