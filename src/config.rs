use crate::errors::{Error, Result};
use crate::output_formatter::OutputFormat;
use crate::patterns::{Rule, RuleFlags, RuleSyntax};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Extensions selected by `--html`.
pub const HTML_EXTENSIONS: &[&str] = &["html", "htm", "shtml", "dhtml"];

/// Extensions selected by `--c-files`.
pub const C_EXTENSIONS: &[&str] = &[
    "c", "cc", "C", "cxx", "cpp", "h", "hh", "H", "hxx", "hpp", "i", "inc", "m", "mm", "M",
];

/// Directory names skipped during recursion unless `--all` is given.
pub const RESERVED_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// What a run does to each target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Rewrite file contents; names stay unchanged.
    #[default]
    Modify,
    /// Rewrite file and directory names; contents stay unchanged.
    RenameOnly,
    /// Rewrite contents first, then names.
    ModifyAndRename,
    /// Rewrite the target string stored in symlinks; nothing else is touched.
    ModifySymlinkTarget,
}

impl Mode {
    pub fn modifies_content(self) -> bool {
        matches!(self, Mode::Modify | Mode::ModifyAndRename)
    }

    pub fn renames(self) -> bool {
        matches!(self, Mode::RenameOnly | Mode::ModifyAndRename)
    }

    pub fn rewrites_symlinks(self) -> bool {
        self == Mode::ModifySymlinkTarget
    }
}

/// How much of a file the preview prints around each replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewContext {
    /// `count` lines before and after each touched line. `separators` prints
    /// a `--LINE--` marker before each block.
    Lines { count: usize, separators: bool },
    WholeFile,
}

impl Default for PreviewContext {
    fn default() -> Self {
        PreviewContext::Lines {
            count: 1,
            separators: true,
        }
    }
}

impl FromStr for PreviewContext {
    type Err = String;

    /// `N` lines, `+N` lines without separators, or a negative number for the
    /// whole file.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, separators) = match s.strip_prefix('+') {
            Some(rest) => (rest, false),
            None => (s, true),
        };
        let value: i64 = digits
            .parse()
            .map_err(|_| format!("invalid context '{s}': expected [+]N or a negative number"))?;
        if value < 0 {
            if !separators {
                return Err(format!("invalid context '{s}': '+' needs a non-negative count"));
            }
            return Ok(PreviewContext::WholeFile);
        }
        Ok(PreviewContext::Lines {
            count: value as usize,
            separators,
        })
    }
}

/// Whether anything is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Execution {
    #[default]
    Live,
    /// Count matches, write nothing.
    Dummy,
    /// Print highlighted matches instead of writing.
    Preview(PreviewContext),
}

impl Execution {
    pub fn writes(self) -> bool {
        self == Execution::Live
    }

    pub fn preview(self) -> Option<PreviewContext> {
        match self {
            Execution::Preview(context) => Some(context),
            _ => None,
        }
    }
}

/// What happens when one target fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the run at the first per-target error.
    #[default]
    Abort,
    /// Log and count the error, then carry on with the next target.
    Continue,
}

/// Escape sequences used to mark replacements in preview output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Highlight {
    pub bold: String,
    pub thin: String,
    pub normal: String,
}

impl Default for Highlight {
    fn default() -> Self {
        Self {
            bold: "\x1b[01m".to_string(),
            thin: "\x1b[07m".to_string(),
            normal: "\x1b[00m".to_string(),
        }
    }
}

/// Settings for one run. Built once, then only read.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub syntax: RuleSyntax,
    pub mode: Mode,
    pub execution: Execution,
    pub recursive: bool,
    pub follow_links: bool,
    /// Also descend into [`RESERVED_DIRS`].
    pub include_all: bool,
    /// When set, only files with one of these (case-sensitive) extensions are
    /// processed, for both content and name changes.
    pub extensions: Option<BTreeSet<String>>,
    pub error_policy: ErrorPolicy,
    pub verbose: u8,
    pub quiet: bool,
    pub format: OutputFormat,
    pub highlight: Highlight,
    pub progress: bool,
}

impl Configuration {
    /// `true` if a non-directory at `path` passes the extension filter.
    pub fn allows_extension(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        path.extension()
            .and_then(|os| os.to_str())
            .is_some_and(|ext| allowed.contains(ext))
    }

    /// `true` if recursion should not enter a directory called `name`.
    pub fn skips_dir(&self, name: &str) -> bool {
        !self.include_all && RESERVED_DIRS.contains(&name)
    }

    /// Adds a comma separated list of extensions to the filter.
    pub fn add_extensions<'a>(&mut self, list: impl IntoIterator<Item = &'a str>) {
        let allowed = self.extensions.get_or_insert_with(BTreeSet::new);
        for ext in list {
            for ext in ext.split(',') {
                let ext = ext.trim().trim_start_matches('.');
                if !ext.is_empty() {
                    allowed.insert(ext.to_string());
                }
            }
        }
    }
}

/// User settings read from `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub highlight: Highlight,
}

/// A file of rules, one entry per pattern.
///
/// ```yaml
/// rules:
///   - pattern: 'IMG([0-9]+)\.jpeg'
///     replacement: 'pic$1.jpg'
///   - pattern: 'a.b'
///     replacement: 'c'
///     literal: true
/// extensions: [txt, md]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RulesFile {
    pub rules: Vec<RuleEntry>,
    /// Added to the extension filter.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
}

/// One rule of a [`RulesFile`]. Unset flags fall back to the command line.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub literal: Option<bool>,
    #[serde(default)]
    pub ignore_case: Option<bool>,
    #[serde(default)]
    pub whole_word: Option<bool>,
}

impl RuleEntry {
    pub fn flags(&self, defaults: RuleFlags) -> RuleFlags {
        RuleFlags {
            literal: self.literal.unwrap_or(defaults.literal),
            ignore_case: self.ignore_case.unwrap_or(defaults.ignore_case),
            whole_word: self.whole_word.unwrap_or(defaults.whole_word),
        }
    }
}

impl RulesFile {
    /// Compiles every entry, stopping at the first bad pattern.
    pub fn compile(&self, syntax: &RuleSyntax, defaults: RuleFlags) -> Result<Vec<Rule>> {
        self.rules
            .iter()
            .map(|entry| {
                Rule::from_parts(
                    &entry.pattern,
                    &entry.replacement,
                    &syntax.marker,
                    entry.flags(defaults),
                )
            })
            .collect()
    }
}

/// A utility for locating and loading YAML configuration files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Finds a configuration file.
    ///
    /// The search order is:
    /// 1. `config_path` itself (absolute, or relative to the current directory).
    /// 2. A path relative to `working_dir`.
    /// 3. Inside the user configuration directory (`~/.config/streplace`).
    pub fn find_config(config_path: &Path, working_dir: &Path) -> Result<PathBuf> {
        if config_path.exists() {
            return Ok(config_path.to_path_buf());
        }

        let in_working_dir = working_dir.join(config_path);
        if in_working_dir.exists() {
            return Ok(in_working_dir);
        }

        let in_user_dir = Self::user_config_dir().map(|dir| dir.join(config_path));
        if let Some(candidate) = &in_user_dir {
            if candidate.exists() {
                return Ok(candidate.clone());
            }
        }

        let mut tried_locations = vec![
            config_path.display().to_string(),
            in_working_dir.display().to_string(),
        ];
        if let Some(candidate) = in_user_dir {
            tried_locations.push(candidate.display().to_string());
        }

        Err(Error::Config(format!(
            "Config file '{}' not found. Searched in:\n  - {}",
            config_path.display(),
            tried_locations.join("\n  - ")
        )))
    }

    /// `~/.config/streplace` (or the platform equivalent).
    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("streplace"))
    }

    /// Loads a [`RulesFile`] from a YAML file.
    pub fn load_rules_file(path: &Path) -> Result<RulesFile> {
        let file = File::open(path).map_err(|e| Error::unreadable(path, e))?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Loads [`Settings`] from `explicit`, or from `config.yaml` in the user
    /// configuration directory if it exists. Missing defaults are not an error.
    pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
        let path = match explicit {
            Some(path) => {
                let working_dir = env::current_dir()?;
                Self::find_config(path, &working_dir)?
            }
            None => match Self::user_config_dir().map(|dir| dir.join("config.yaml")) {
                Some(path) if path.exists() => path,
                _ => return Ok(Settings::default()),
            },
        };
        let file = File::open(&path).map_err(|e| Error::unreadable(&path, e))?;
        Ok(serde_yaml::from_reader(file)?)
    }
}
