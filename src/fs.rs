//! Filesystem access used by traversal and mutation.
//!
//! Everything the engine does to disk goes through [`FileSystem`], so the
//! matching and mode dispatch logic can run against [`MemoryFileSystem`] in
//! tests and against [`OsFileSystem`] for real.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// What a directory entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Devices, fifos, sockets.
    Other,
}

impl EntryKind {
    pub fn describe(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "directory",
            EntryKind::Symlink => "symlink",
            EntryKind::Other => "special file",
        }
    }
}

/// The filesystem operations the engine needs.
pub trait FileSystem {
    /// Classifies `path`. With `follow_links`, a symlink is classified by
    /// what it points to.
    fn kind(&self, path: &Path, follow_links: bool) -> io::Result<EntryKind>;

    /// Children of `dir`, sorted by file name.
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replaces the content of `path` so that readers see either the old or
    /// the new content, never a partial write. Writes through symlinks.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Renames `from` itself (a symlink is renamed, not its target).
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// `true` if an entry exists at `path`, dangling symlinks included.
    fn exists(&self, path: &Path) -> bool;

    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Atomically replaces the symlink at `path` with one pointing to `target`.
    fn write_link(&self, path: &Path, target: &Path) -> io::Result<()>;

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn kind(&self, path: &Path, follow_links: bool) -> io::Result<EntryKind> {
        let metadata = if follow_links {
            std::fs::metadata(path)?
        } else {
            std::fs::symlink_metadata(path)?
        };
        let file_type = metadata.file_type();
        Ok(if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        })
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| entry.map(|e| e.into_path()).map_err(io::Error::from))
            .collect()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let is_link = std::fs::symlink_metadata(path)?.file_type().is_symlink();
        let target = if is_link {
            std::fs::canonicalize(path)?
        } else {
            path.to_path_buf()
        };

        let mut temp_file = NamedTempFile::new_in(parent_dir(&target))?;
        temp_file.write_all(data)?;
        temp_file.as_file().sync_all()?;

        // Preserve file permissions
        let perms = std::fs::metadata(&target)?.permissions();
        std::fs::set_permissions(temp_file.path(), perms)?;

        temp_file.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    #[cfg(unix)]
    fn write_link(&self, path: &Path, target: &Path) -> io::Result<()> {
        // Build the new link next to the old one, then rename it into place.
        let staging = tempfile::Builder::new()
            .prefix(".streplace-")
            .tempdir_in(parent_dir(path))?;
        let staged = staging.path().join("link");
        std::os::unix::fs::symlink(target, &staged)?;
        std::fs::rename(&staged, path)
    }

    #[cfg(not(unix))]
    fn write_link(&self, path: &Path, _target: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("can't rewrite symlink '{}' on this platform", path.display()),
        ))
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
    Symlink(PathBuf),
}

/// An in-memory filesystem with absolute paths and a root directory `/`.
///
/// Paths registered with [`MemoryFileSystem::deny`] fail every read and
/// write with `PermissionDenied`.
#[derive(Debug)]
pub struct MemoryFileSystem {
    nodes: RefCell<BTreeMap<PathBuf, Node>>,
    denied: RefCell<BTreeSet<PathBuf>>,
}

const MAX_LINK_HOPS: usize = 40;

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::Dir);
        Self {
            nodes: RefCell::new(nodes),
            denied: RefCell::new(BTreeSet::new()),
        }
    }

    /// Adds a directory and any missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> &Self {
        let mut nodes = self.nodes.borrow_mut();
        for ancestor in path.as_ref().ancestors() {
            if !ancestor.as_os_str().is_empty() {
                nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
            }
        }
        drop(nodes);
        self
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> &Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.nodes
            .borrow_mut()
            .insert(path.to_path_buf(), Node::File(content.into()));
        self
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) -> &Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.nodes
            .borrow_mut()
            .insert(path.to_path_buf(), Node::Symlink(target.into()));
        self
    }

    pub fn deny(&self, path: impl Into<PathBuf>) -> &Self {
        self.denied.borrow_mut().insert(path.into());
        self
    }

    /// Content of the regular file stored at exactly `path`.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.nodes.borrow().get(path.as_ref()) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        matches!(self.nodes.borrow().get(path.as_ref()), Some(Node::Dir))
    }

    pub fn link(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        match self.nodes.borrow().get(path.as_ref()) {
            Some(Node::Symlink(target)) => Some(target.clone()),
            _ => None,
        }
    }

    /// Resolves symlinks in every component of `path`; the last component is
    /// only resolved when `follow_last` is set.
    fn resolve(&self, path: &Path, follow_last: bool) -> io::Result<PathBuf> {
        let nodes = self.nodes.borrow();
        let mut stack: Vec<PathBuf> = path
            .components()
            .rev()
            .map(|c| PathBuf::from(c.as_os_str()))
            .collect();
        let mut resolved = PathBuf::from("/");
        let mut hops = 0;

        while let Some(part) = stack.pop() {
            match part.components().next() {
                Some(Component::RootDir | Component::Prefix(_)) => resolved = PathBuf::from("/"),
                Some(Component::ParentDir) => {
                    resolved.pop();
                }
                Some(Component::CurDir) | None => {}
                Some(Component::Normal(name)) => {
                    let candidate = resolved.join(name);
                    let is_last = stack.is_empty();
                    match nodes.get(&candidate) {
                        Some(Node::Symlink(target)) if follow_last || !is_last => {
                            hops += 1;
                            if hops > MAX_LINK_HOPS {
                                return Err(io::Error::other(format!(
                                    "too many levels of symbolic links: {}",
                                    path.display()
                                )));
                            }
                            stack.extend(
                                target
                                    .components()
                                    .rev()
                                    .map(|c| PathBuf::from(c.as_os_str())),
                            );
                        }
                        _ => resolved = candidate,
                    }
                }
            }
        }
        Ok(resolved)
    }

    fn check_access(&self, path: &Path, resolved: &Path) -> io::Result<()> {
        let denied = self.denied.borrow();
        if denied.contains(path) || denied.contains(resolved) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", path.display()),
            ));
        }
        Ok(())
    }

    fn node(&self, resolved: &Path) -> io::Result<Node> {
        self.nodes.borrow().get(resolved).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file or directory: {}", resolved.display()),
            )
        })
    }

    /// Resolves the parent of `path` and re-attaches its file name.
    fn resolve_entry(&self, path: &Path) -> io::Result<PathBuf> {
        let name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let parent = self.resolve(parent_dir(path), true)?;
        match self.node(&parent)? {
            Node::Dir => Ok(parent.join(name)),
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", parent.display()),
            )),
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn kind(&self, path: &Path, follow_links: bool) -> io::Result<EntryKind> {
        let resolved = self.resolve(path, follow_links)?;
        Ok(match self.node(&resolved)? {
            Node::File(_) => EntryKind::File,
            Node::Dir => EntryKind::Dir,
            Node::Symlink(_) => EntryKind::Symlink,
        })
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let resolved = self.resolve(dir, true)?;
        self.check_access(dir, &resolved)?;
        if !matches!(self.node(&resolved)?, Node::Dir) {
            return Err(io::Error::other(format!("not a directory: {}", dir.display())));
        }
        let mut children: Vec<PathBuf> = self
            .nodes
            .borrow()
            .keys()
            .filter(|key| key.parent() == Some(resolved.as_path()))
            .filter_map(|key| key.file_name().map(|name| dir.join(name)))
            .collect();
        children.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(children)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let resolved = self.resolve(path, true)?;
        self.check_access(path, &resolved)?;
        match self.node(&resolved)? {
            Node::File(content) => Ok(content),
            _ => Err(io::Error::other(format!("not a regular file: {}", path.display()))),
        }
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let resolved = self.resolve(path, true)?;
        self.check_access(path, &resolved)?;
        match self.node(&resolved)? {
            Node::File(_) => {
                self.nodes
                    .borrow_mut()
                    .insert(resolved, Node::File(data.to_vec()));
                Ok(())
            }
            _ => Err(io::Error::other(format!("not a regular file: {}", path.display()))),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let source = self.resolve_entry(from)?;
        let dest = self.resolve_entry(to)?;
        self.check_access(from, &source)?;
        self.check_access(to, &dest)?;
        self.node(&source)?;

        let mut nodes = self.nodes.borrow_mut();
        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|key| key.starts_with(&source))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let suffix = old.strip_prefix(&source).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    dest.clone()
                } else {
                    dest.join(suffix)
                };
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path, false)
            .is_ok_and(|resolved| self.nodes.borrow().contains_key(&resolved))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let resolved = self.resolve(path, false)?;
        self.check_access(path, &resolved)?;
        match self.node(&resolved)? {
            Node::Symlink(target) => Ok(target),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a symlink: {}", path.display()),
            )),
        }
    }

    fn write_link(&self, path: &Path, target: &Path) -> io::Result<()> {
        let resolved = self.resolve(path, false)?;
        self.check_access(path, &resolved)?;
        self.nodes
            .borrow_mut()
            .insert(resolved, Node::Symlink(target.to_path_buf()));
        Ok(())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let resolved = self.resolve(path, true)?;
        self.node(&resolved)?;
        Ok(resolved)
    }
}
