use crate::config::{Configuration, ErrorPolicy, Execution, Mode};
use crate::errors::{Error, Result};
use crate::file_renamer::{FileRenamer, PlannedRenames};
use crate::fs::{EntryKind, FileSystem, OsFileSystem};
use crate::output_formatter::{OutputFormat, OutputFormatter};
use crate::patterns::{apply_rules, Rule};
use crate::scanner::{Scanner, Target, Visit};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Counters for one run, returned by [`Replacer::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Targets whose content or name was examined.
    pub files_considered: usize,
    /// Targets where at least one rule matched.
    pub files_changed: usize,
    pub matches_total: usize,
    /// Renames performed (or that would be performed in a dummy run).
    pub renamed: usize,
    pub symlinks_changed: usize,
    pub dirs_visited: usize,
    /// Entries left alone because of the mode or a traversal filter.
    pub ignored: usize,
    /// Per-target errors skipped under [`ErrorPolicy::Continue`].
    pub errors: usize,
    /// Matches per rule, in rule order.
    pub rule_matches: Vec<usize>,
}

impl RunStats {
    fn add_rule_matches(&mut self, counts: &[usize]) {
        if self.rule_matches.len() < counts.len() {
            self.rule_matches.resize(counts.len(), 0);
        }
        for (total, count) in self.rule_matches.iter_mut().zip(counts) {
            *total += count;
        }
        self.matches_total += counts.iter().sum::<usize>();
    }
}

/// Core engine applying a set of rules to files, names and symlinks.
pub struct Replacer {
    rules: Vec<Rule>,
    config: Configuration,
}

impl Replacer {
    pub fn new(rules: Vec<Rule>, config: Configuration) -> Self {
        Self { rules, config }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Processes every target under `roots`, in traversal order.
    ///
    /// Previews and verbose messages go to `out`. With [`ErrorPolicy::Abort`]
    /// all roots must exist before anything is touched, and the first
    /// per-target error ends the run.
    pub fn run<F, W>(&self, roots: &[PathBuf], fs: &F, out: &mut W) -> Result<RunStats>
    where
        F: FileSystem + ?Sized,
        W: Write,
    {
        if self.config.error_policy == ErrorPolicy::Abort {
            if let Some(missing) = roots.iter().find(|root| !fs.exists(root)) {
                return Err(Error::unreadable(
                    missing,
                    io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
                ));
            }
        }

        let visits = Scanner::new(fs, &self.config).enumerate(roots);
        let progress = self.progress_bar(visits.len());

        let mut pass = Pass {
            rules: &self.rules,
            config: &self.config,
            fs,
            out,
            formatter: OutputFormatter::new(self.config.format, self.config.highlight.clone()),
            planned: PlannedRenames::new(),
            stats: RunStats {
                rule_matches: vec![0; self.rules.len()],
                ..RunStats::default()
            },
        };

        for visit in visits {
            match visit {
                Visit::Target(mut target) => {
                    progress.set_message(target.path.display().to_string());
                    if let Err(e) = pass.process(&mut target) {
                        pass.recover(e)?;
                    }
                }
                Visit::Skipped { path, reason } => {
                    debug!("Skipping {} ({reason})", path.display());
                    pass.stats.ignored += 1;
                }
                Visit::Failed(e) => pass.recover(e)?,
            }
            progress.inc(1);
        }

        progress.finish_and_clear();
        Ok(pass.stats)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map(|style| style.progress_chars("##-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}

/// State of one run over the targets.
struct Pass<'r, F: ?Sized, W> {
    rules: &'r [Rule],
    config: &'r Configuration,
    fs: &'r F,
    out: &'r mut W,
    formatter: OutputFormatter,
    /// Renames a dummy or preview run would have made.
    planned: PlannedRenames,
    stats: RunStats,
}

impl<F: FileSystem + ?Sized, W: Write> Pass<'_, F, W> {
    /// Applies the error policy to a failed target.
    fn recover(&mut self, error: Error) -> Result<()> {
        if error.is_fatal() || self.config.error_policy == ErrorPolicy::Abort {
            return Err(error);
        }
        warn!("{error}");
        self.stats.errors += 1;
        Ok(())
    }

    /// Per-target messages are only mixed into text output.
    fn verbose(&self) -> bool {
        self.config.verbose > 0 && !self.config.quiet && self.config.format == OutputFormat::Text
    }

    /// Announces renames and symlink changes in verbose and preview runs.
    fn announces(&self) -> bool {
        self.verbose() || self.config.execution.preview().is_some()
    }

    fn process(&mut self, target: &mut Target) -> Result<()> {
        let matches = match (self.config.mode, target.kind) {
            (Mode::ModifySymlinkTarget, EntryKind::Symlink) => {
                self.stats.files_considered += 1;
                self.retarget(target)?
            }
            (Mode::Modify, EntryKind::File) => {
                self.stats.files_considered += 1;
                self.modify(target)?
            }
            (Mode::ModifyAndRename, EntryKind::File) => {
                self.stats.files_considered += 1;
                // Content lands at the original path before the entry moves.
                let content = self.modify(target)?;
                content + self.rename(target)?
            }
            (Mode::Modify, EntryKind::Dir) if self.config.recursive => {
                self.stats.dirs_visited += 1;
                0
            }
            (Mode::RenameOnly | Mode::ModifyAndRename, EntryKind::File | EntryKind::Dir | EntryKind::Symlink) => {
                if target.kind == EntryKind::Dir {
                    self.stats.dirs_visited += 1;
                }
                self.stats.files_considered += 1;
                self.rename(target)?
            }
            _ => {
                self.ignore(target)?;
                return Ok(());
            }
        };

        if matches > 0 {
            self.stats.files_changed += 1;
        }
        Ok(())
    }

    fn ignore(&mut self, target: &Target) -> Result<()> {
        debug!("Ignoring {} {}", target.kind.describe(), target.path.display());
        if self.verbose() {
            writeln!(
                self.out,
                "Ignoring {} '{}'",
                target.kind.describe(),
                target.path.display()
            )?;
        }
        self.stats.ignored += 1;
        Ok(())
    }

    /// Rewrites the content of a regular file. Returns the number of matches.
    fn modify(&mut self, target: &mut Target) -> Result<usize> {
        let path = &target.path;
        let data = self.fs.read(path).map_err(|e| Error::unreadable(path, e))?;
        let preview = self.config.execution.preview();
        let rewrite = apply_rules(self.rules, &data, preview.is_some());
        let matches = rewrite.matches();
        self.stats.add_rule_matches(&rewrite.rule_matches);

        if self.verbose() && preview.is_none() {
            self.formatter.write_processing(&mut *self.out, path, matches)?;
        }
        if matches == 0 {
            return Ok(0);
        }
        target.matched_content = true;

        match self.config.execution {
            Execution::Live => {
                if rewrite.output != data {
                    self.fs
                        .write_atomic(path, &rewrite.output)
                        .map_err(|e| Error::unwritable(path, e))?;
                    info!("Modified {} ({} matches)", path.display(), matches);
                }
            }
            Execution::Dummy => {}
            Execution::Preview(context) => {
                self.formatter.write_preview(&mut *self.out, path, &rewrite, context)?;
            }
        }
        Ok(matches)
    }

    /// Rewrites the basename of a target. Returns the number of matches.
    fn rename(&mut self, target: &mut Target) -> Result<usize> {
        let Some(change) = FileRenamer::new(self.rules).rename_target(&target.path)? else {
            return Ok(0);
        };
        target.matched_name = true;
        self.stats.add_rule_matches(&change.rule_matches);
        if !change.is_change() {
            return Ok(change.matches());
        }

        self.planned.check(self.fs, &change)?;
        if self.announces() {
            self.formatter.write_rename(&mut *self.out, &change.from, &change.to)?;
        }
        if self.config.execution.writes() {
            FileRenamer::commit_rename(self.fs, &change)?;
            target.path = change.to.clone();
        } else {
            self.planned.record(&change);
        }
        self.stats.renamed += 1;
        Ok(change.matches())
    }

    /// Rewrites the target string of a symlink. Returns the number of matches.
    fn retarget(&mut self, target: &mut Target) -> Result<usize> {
        let Some(change) = FileRenamer::new(self.rules).retarget_link(self.fs, &target.path)? else {
            return Ok(0);
        };
        target.matched_name = true;
        self.stats.add_rule_matches(&change.rule_matches);
        if !change.is_change() {
            return Ok(change.matches());
        }

        if self.announces() {
            self.formatter
                .write_symlink_change(&mut *self.out, &target.path, &change.from, &change.to)?;
        }
        if self.config.execution.writes() {
            FileRenamer::commit_link(self.fs, &target.path, &change)?;
        }
        self.stats.symlinks_changed += 1;
        Ok(change.matches())
    }
}

/// The main entry point for a replace run on the real filesystem.
///
/// Prints the rules at `-vv` and the summary at `-v` to standard output. A
/// JSON summary is always printed unless `--quiet` is given.
pub fn run_replace(rules: Vec<Rule>, config: Configuration, roots: &[PathBuf]) -> Result<RunStats> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let formatter = OutputFormatter::new(config.format, config.highlight.clone());
    let json = config.format == OutputFormat::Json;
    let reports = !config.quiet && (config.verbose > 0 || json);
    let detailed = reports && !json && config.verbose >= 2;

    if detailed {
        writeln!(out, "Rules:")?;
        for rule in &rules {
            writeln!(out, "  {rule}")?;
        }
    }

    let replacer = Replacer::new(rules, config);
    let stats = replacer.run(roots, &OsFileSystem, &mut out)?;

    if reports {
        if detailed {
            formatter.write_rule_report(&mut out, replacer.rules(), &stats)?;
        }
        formatter.write_summary(&mut out, &stats, replacer.rules())?;
    }
    out.flush()?;
    Ok(stats)
}
