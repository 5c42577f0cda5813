//! Tree walker.
//!
//! Turns a source root into a lazy, ordered sequence of [`TreeEntry`] values.
//! Order is inherited from [`FileSystem::enumerate`]: depth-first, a directory
//! before its contents, siblings by file name. Walking an unchanged tree twice
//! yields the same sequence. File bodies are read on demand through
//! [`TreeWalker::read`].

use std::path::{Path, PathBuf};

use crate::archive::ArchivePath;
use crate::error::{ArchiverError, Result};
use crate::fsx::{FileSystem, NodeIter, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryKind {
    File,
    Directory,
}

/// One walked node: where it lives on disk and where it goes in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: ArchivePath,
    pub source: PathBuf,
    pub kind: TreeEntryKind,
}

pub struct TreeWalker<'a, F: FileSystem> {
    fs: &'a F,
    root: PathBuf,
    root_kind: NodeKind,
}

impl<'a, F: FileSystem> TreeWalker<'a, F> {
    /// Fails with `SourceNotFound` if `root` does not exist.
    ///
    /// `root` may be a single regular file; the walk then yields that file
    /// under its own name.
    pub fn new(fs: &'a F, root: &Path) -> Result<Self> {
        let root_kind = fs
            .kind(root)
            .map_err(|e| ArchiverError::io(root, e))?
            .ok_or_else(|| ArchiverError::SourceNotFound { path: root.to_path_buf() })?;
        if root_kind == NodeKind::Other {
            return Err(ArchiverError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "source is neither a file nor a directory"),
            ));
        }
        Ok(TreeWalker { fs, root: root.to_path_buf(), root_kind })
    }

    /// Starts a fresh pass over the tree.
    pub fn walk(&self) -> Walk<'a> {
        match self.root_kind {
            NodeKind::File => Walk { state: WalkState::Single(Some(self.root.clone())), root: self.root.clone() },
            _ => Walk { state: WalkState::Tree(self.fs.enumerate(&self.root)), root: self.root.clone() },
        }
    }

    /// Reads the full body of a file entry.
    pub fn read(&self, entry: &TreeEntry) -> Result<Vec<u8>> {
        self.fs.read_file(&entry.source).map_err(|e| ArchiverError::io(&entry.source, e))
    }
}

enum WalkState<'a> {
    Single(Option<PathBuf>),
    Tree(NodeIter<'a>),
}

/// Iterator returned by [`TreeWalker::walk`].
pub struct Walk<'a> {
    state: WalkState<'a>,
    root: PathBuf,
}

impl Walk<'_> {
    fn single(file: PathBuf) -> Result<TreeEntry> {
        let name = file
            .file_name()
            .ok_or_else(|| ArchiverError::SourceNotFound { path: file.clone() })?;
        Ok(TreeEntry { path: ArchivePath::from_relative(Path::new(name))?, source: file, kind: TreeEntryKind::File })
    }
}

impl Iterator for Walk<'_> {
    type Item = Result<TreeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = match &mut self.state {
            WalkState::Single(file) => {
                let file = file.take()?;
                return Some(Walk::single(file));
            }
            WalkState::Tree(nodes) => nodes,
        };
        loop {
            let node = match nodes.next()? {
                Ok(node) => node,
                Err(e) => return Some(Err(ArchiverError::io(&self.root, e))),
            };
            let kind = match node.kind {
                NodeKind::File => TreeEntryKind::File,
                NodeKind::Directory => TreeEntryKind::Directory,
                NodeKind::Other => {
                    tracing::warn!("skipping special file {}", node.path.display());
                    continue;
                }
            };
            let relative = match node.path.strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => {
                    return Some(Err(ArchiverError::io(
                        &node.path,
                        std::io::Error::new(std::io::ErrorKind::InvalidData, "walked outside the source root"),
                    )))
                }
            };
            let path = match ArchivePath::from_relative(relative) {
                Ok(path) => path,
                Err(e) => return Some(Err(e)),
            };
            tracing::trace!("walked {:?} {}", kind, path);
            return Some(Ok(TreeEntry { path, source: node.path, kind }));
        }
    }
}
