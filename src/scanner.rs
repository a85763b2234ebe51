use crate::config::Configuration;
use crate::errors::Error;
use crate::fs::{EntryKind, FileSystem};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A file, directory or symlink considered during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Set by the pipeline when at least one rule matched the content.
    pub matched_content: bool,
    /// Set by the pipeline when at least one rule matched the name (or the
    /// symlink target string).
    pub matched_name: bool,
}

impl Target {
    pub fn new(path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            kind,
            matched_content: false,
            matched_name: false,
        }
    }
}

/// One step of a traversal, in the order the pipeline must handle them.
#[derive(Debug)]
pub enum Visit {
    Target(Target),
    /// An entry left out by a traversal policy.
    Skipped { path: PathBuf, reason: &'static str },
    /// An entry or directory that could not be inspected.
    Failed(Error),
}

/// Walks the roots of a run and lists its targets.
///
/// Directory entries are visited in file name order and every directory comes
/// after its contents, so renaming a directory never invalidates a path that
/// is still waiting to be processed.
pub struct Scanner<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    config: &'a Configuration,
}

impl<'a, F: FileSystem + ?Sized> Scanner<'a, F> {
    pub fn new(fs: &'a F, config: &'a Configuration) -> Self {
        Self { fs, config }
    }

    /// Symlinks are never dereferenced when their target strings are the
    /// thing being rewritten.
    fn follows_links(&self) -> bool {
        self.config.follow_links && !self.config.mode.rewrites_symlinks()
    }

    /// Lists every target reachable from `roots`.
    ///
    /// Root arguments are taken as given: the reserved directory check only
    /// applies to directories found while recursing.
    pub fn enumerate(&self, roots: &[PathBuf]) -> Vec<Visit> {
        let mut visits = Vec::new();
        let mut ancestors = Vec::new();
        for root in roots {
            self.visit(root, true, &mut ancestors, &mut visits);
        }
        visits
    }

    fn visit(&self, path: &Path, is_root: bool, ancestors: &mut Vec<PathBuf>, visits: &mut Vec<Visit>) {
        let kind = match self.classify(path) {
            Ok(kind) => kind,
            Err(e) => {
                visits.push(Visit::Failed(Error::unreadable(path, e)));
                return;
            }
        };

        if kind != EntryKind::Dir {
            if self.config.allows_extension(path) {
                visits.push(Visit::Target(Target::new(path, kind)));
            } else {
                visits.push(Visit::Skipped {
                    path: path.to_path_buf(),
                    reason: "extension filter",
                });
            }
            return;
        }

        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !is_root && self.config.skips_dir(name) {
            visits.push(Visit::Skipped {
                path: path.to_path_buf(),
                reason: "reserved directory",
            });
            return;
        }

        if self.config.recursive {
            self.descend(path, ancestors, visits);
        }
        visits.push(Visit::Target(Target::new(path, EntryKind::Dir)));
    }

    fn descend(&self, dir: &Path, ancestors: &mut Vec<PathBuf>, visits: &mut Vec<Visit>) {
        let identity = if self.follows_links() {
            match self.fs.canonicalize(dir) {
                Ok(identity) => identity,
                Err(e) => {
                    visits.push(Visit::Failed(Error::unreadable(dir, e)));
                    return;
                }
            }
        } else {
            dir.to_path_buf()
        };
        if ancestors.contains(&identity) {
            warn!("Not descending into '{}': directory cycle", dir.display());
            visits.push(Visit::Skipped {
                path: dir.to_path_buf(),
                reason: "directory cycle",
            });
            return;
        }

        debug!("Descending into {}", dir.display());
        match self.fs.list_dir(dir) {
            Ok(children) => {
                ancestors.push(identity);
                for child in children {
                    self.visit(&child, false, ancestors, visits);
                }
                ancestors.pop();
            }
            Err(e) => visits.push(Visit::Failed(Error::unreadable(dir, e))),
        }
    }

    /// A dangling symlink is still a symlink when links are followed.
    fn classify(&self, path: &Path) -> std::io::Result<EntryKind> {
        if !self.follows_links() {
            return self.fs.kind(path, false);
        }
        match self.fs.kind(path, true) {
            Ok(kind) => Ok(kind),
            Err(e) => match self.fs.kind(path, false) {
                Ok(EntryKind::Symlink) => Ok(EntryKind::Symlink),
                _ => Err(e),
            },
        }
    }
}
