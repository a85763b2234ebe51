use crate::errors::{Error, Result};
use crate::fs::FileSystem;
use crate::patterns::{apply_rules, Rule};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// A name (or symlink target) that at least one rule matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChange {
    pub from: PathBuf,
    pub to: PathBuf,
    pub rule_matches: Vec<usize>,
}

impl NameChange {
    pub fn matches(&self) -> usize {
        self.rule_matches.iter().sum()
    }

    /// `false` when the rules matched but produced the same text.
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// Applies rules to basenames and symlink targets.
pub struct FileRenamer<'a> {
    rules: &'a [Rule],
}

impl<'a> FileRenamer<'a> {
    pub fn new(rules: &'a [Rule]) -> Self {
        Self { rules }
    }

    /// Computes the new path for `path` by rewriting its basename only.
    ///
    /// Returns `Ok(None)` when no rule matched. The rewritten name must be a
    /// single, non-empty UTF-8 path component.
    pub fn rename_target(&self, path: &Path) -> Result<Option<NameChange>> {
        let Some(name) = path.file_name() else {
            return Ok(None);
        };
        let rewrite = apply_rules(self.rules, name.as_encoded_bytes(), false);
        if rewrite.matches() == 0 {
            return Ok(None);
        }

        let invalid = |name: String| Error::InvalidName {
            path: path.to_path_buf(),
            name,
        };
        let new_name = String::from_utf8(rewrite.output)
            .map_err(|e| invalid(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
        if new_name.is_empty()
            || new_name == "."
            || new_name == ".."
            || new_name.contains(['/', '\0'])
            || new_name.contains(std::path::MAIN_SEPARATOR)
        {
            return Err(invalid(new_name));
        }

        Ok(Some(NameChange {
            from: path.to_path_buf(),
            to: path.with_file_name(new_name),
            rule_matches: rewrite.rule_matches,
        }))
    }

    /// Computes the new target string of the symlink at `link`.
    ///
    /// The link is read, never followed.
    pub fn retarget_link<F: FileSystem + ?Sized>(&self, fs: &F, link: &Path) -> Result<Option<NameChange>> {
        let target = fs.read_link(link).map_err(|e| Error::unreadable(link, e))?;
        let rewrite = apply_rules(self.rules, target.as_os_str().as_encoded_bytes(), false);
        if rewrite.matches() == 0 {
            return Ok(None);
        }

        let new_target = String::from_utf8(rewrite.output).map_err(|e| Error::InvalidName {
            path: link.to_path_buf(),
            name: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })?;
        if new_target.is_empty() || new_target.contains('\0') {
            return Err(Error::InvalidName {
                path: link.to_path_buf(),
                name: new_target,
            });
        }

        Ok(Some(NameChange {
            from: target,
            to: PathBuf::from(new_target),
            rule_matches: rewrite.rule_matches,
        }))
    }

    /// Renames `change.from` to `change.to`, refusing to replace an existing
    /// entry.
    pub fn commit_rename<F: FileSystem + ?Sized>(fs: &F, change: &NameChange) -> Result<()> {
        check_collision(fs, change)?;
        fs.rename(&change.from, &change.to)
            .map_err(|e| Error::unwritable(&change.from, e))?;
        info!("Renamed {} -> {}", change.from.display(), change.to.display());
        Ok(())
    }

    /// Points the symlink at `link` to `change.to`.
    pub fn commit_link<F: FileSystem + ?Sized>(fs: &F, link: &Path, change: &NameChange) -> Result<()> {
        fs.write_link(link, &change.to)
            .map_err(|e| Error::unwritable(link, e))?;
        info!(
            "Symlink {} now points to {}",
            link.display(),
            change.to.display()
        );
        Ok(())
    }
}

/// Checks that a rename would not replace an existing entry.
pub fn check_collision<F: FileSystem + ?Sized>(fs: &F, change: &NameChange) -> Result<()> {
    if change.is_change() && fs.exists(&change.to) {
        return Err(Error::RenameCollision {
            from: change.from.clone(),
            to: change.to.clone(),
        });
    }
    Ok(())
}

/// Renames a run has decided on but not performed, so later collision checks
/// see the tree a live run would have produced.
#[derive(Debug, Default)]
pub struct PlannedRenames {
    vacated: HashSet<PathBuf>,
    occupied: HashSet<PathBuf>,
}

impl PlannedRenames {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `path` exists once the recorded renames are applied.
    pub fn exists<F: FileSystem + ?Sized>(&self, fs: &F, path: &Path) -> bool {
        if self.occupied.contains(path) {
            return true;
        }
        !self.vacated.contains(path) && fs.exists(path)
    }

    /// Like [`check_collision`], against the tree with the recorded renames applied.
    pub fn check<F: FileSystem + ?Sized>(&self, fs: &F, change: &NameChange) -> Result<()> {
        if change.is_change() && self.exists(fs, &change.to) {
            return Err(Error::RenameCollision {
                from: change.from.clone(),
                to: change.to.clone(),
            });
        }
        Ok(())
    }

    pub fn record(&mut self, change: &NameChange) {
        self.occupied.remove(&change.from);
        self.vacated.insert(change.from.clone());
        self.vacated.remove(&change.to);
        self.occupied.insert(change.to.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::patterns::{RuleFlags, RuleSyntax};

    fn rules(specs: &[&str]) -> Vec<Rule> {
        specs
            .iter()
            .map(|s| Rule::parse(s, &RuleSyntax::default(), RuleFlags::default()).unwrap())
            .collect()
    }

    #[test]
    fn test_planned_renames_shadow_the_filesystem() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/w/a", "").add_file("/w/b", "");
        let mut planned = PlannedRenames::new();
        let change = |from: &str, to: &str| NameChange {
            from: PathBuf::from(from),
            to: PathBuf::from(to),
            rule_matches: vec![1],
        };

        planned.check(&fs, &change("/w/a", "/w/c")).unwrap();
        planned.record(&change("/w/a", "/w/c"));
        assert!(!planned.exists(&fs, Path::new("/w/a")));
        assert!(planned.exists(&fs, Path::new("/w/c")));

        let err = planned.check(&fs, &change("/w/b", "/w/c")).unwrap_err();
        assert!(matches!(err, Error::RenameCollision { .. }));
        planned.check(&fs, &change("/w/b", "/w/a")).unwrap();
        assert!(fs.file("/w/a").is_some());
    }

    #[test]
    fn test_rename_rewrites_basename_only() {
        let rules = rules(&["foo=bar"]);
        let renamer = FileRenamer::new(&rules);
        let change = renamer
            .rename_target(Path::new("foo/foo.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(change.to, PathBuf::from("foo/bar.txt"));
        assert_eq!(change.matches(), 1);
        assert!(change.is_change());

        assert!(renamer.rename_target(Path::new("foo/x.txt")).unwrap().is_none());
    }

    #[test]
    fn test_rules_apply_in_order_to_names() {
        let rules = rules(&["IMG([0-9]+)=pic$1", "jpeg=jpg"]);
        let renamer = FileRenamer::new(&rules);
        let change = renamer.rename_target(Path::new("d/IMG42.jpeg")).unwrap().unwrap();
        assert_eq!(change.to, PathBuf::from("d/pic42.jpg"));
        assert_eq!(change.rule_matches, vec![1, 1]);
    }

    #[test]
    fn test_matched_but_unchanged_name() {
        let rules = rules(&["foo=foo"]);
        let change = FileRenamer::new(&rules)
            .rename_target(Path::new("foo"))
            .unwrap()
            .unwrap();
        assert!(!change.is_change());
    }

    #[test]
    fn test_invalid_new_names() {
        for rule in ["foo.txt=", "foo=a/b", "foo.txt=.."] {
            let rules = rules(&[rule]);
            let err = FileRenamer::new(&rules)
                .rename_target(Path::new("d/foo.txt"))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidName { .. }), "{rule}: {err}");
        }
    }

    #[test]
    fn test_retarget_and_commit_link() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/w/new.txt", "x").add_symlink("/w/link", "old.txt");
        let rules = rules(&["old=new"]);
        let renamer = FileRenamer::new(&rules);

        let change = renamer.retarget_link(&fs, Path::new("/w/link")).unwrap().unwrap();
        assert_eq!(change.from, PathBuf::from("old.txt"));
        assert_eq!(change.to, PathBuf::from("new.txt"));

        FileRenamer::commit_link(&fs, Path::new("/w/link"), &change).unwrap();
        assert_eq!(fs.link("/w/link"), Some(PathBuf::from("new.txt")));
    }

    #[test]
    fn test_commit_rename_refuses_collisions() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/w/foo", "1").add_file("/w/bar", "2");
        let rules = rules(&["foo=bar"]);
        let change = FileRenamer::new(&rules)
            .rename_target(Path::new("/w/foo"))
            .unwrap()
            .unwrap();

        assert!(matches!(check_collision(&fs, &change), Err(Error::RenameCollision { .. })));
        let err = FileRenamer::commit_rename(&fs, &change).unwrap_err();
        assert!(matches!(err, Error::RenameCollision { .. }));
        assert_eq!(fs.file("/w/foo"), Some(b"1".to_vec()));
        assert_eq!(fs.file("/w/bar"), Some(b"2".to_vec()));
    }
}
