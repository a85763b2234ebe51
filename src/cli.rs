use crate::config::{
    ConfigLoader, Configuration, ErrorPolicy, Execution, Mode, PreviewContext, C_EXTENSIONS,
    HTML_EXTENSIONS,
};
use crate::errors::{Error, Result};
use crate::output_formatter::OutputFormat;
use crate::patterns::{Rule, RuleFlags, RuleSyntax};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Replace strings in files, filenames and symbolic links, in place,
/// recursively.
///
/// Each argument containing the separator (default `=`) is a rule, every
/// other argument is a file or directory. Rules are applied in order.
#[derive(Parser, Debug)]
#[command(
    name = "streplace",
    author,
    version,
    about = "Replace strings in files, filenames and symlinks, in place, recursively",
    long_about = "streplace - replace strings in file contents, file and directory names, and symlink targets.

Arguments containing the separator (default '=') are rules of the form
PATTERN=REPLACEMENT; all other arguments are files or directories. Arguments
after '--' are always paths.

QUICK EXAMPLES:
  streplace foo=bar file.txt                   # Replace foo with bar in file.txt
  streplace -r 'IMG([0-9]*).jpeg=pic$1.jpg' .  # Reuse groups ($& is the whole match)
  streplace -rN old=new src/                   # Rename only, never touch content
  streplace -P --context=2 foo=bar .           # Preview without writing
  streplace -x 'a.b=a\\=b' file.txt            # Literal pattern, escaped separator"
)]
pub struct Args {
    /// Rules (PATTERN=REPLACEMENT) and paths, in any order.
    #[arg(value_name = "RULE|PATH")]
    pub args: Vec<String>,

    /// Paths given after `--`; never parsed as rules.
    #[arg(last = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    // File options.
    /// Recursively process directories.
    #[arg(short, long, help_heading = "File options")]
    pub recursive: bool,

    /// Follow symbolic links.
    #[arg(short = 'l', long, help_heading = "File options")]
    pub follow_links: bool,

    /// Process all directories. By default `.git`, `.hg` and `.svn` are skipped.
    #[arg(long, help_heading = "File options")]
    pub all: bool,

    /// Only process files with these extensions (comma separated, repeatable).
    #[arg(short = 'o', long = "only", value_name = "EXTS", help_heading = "File options")]
    pub only: Vec<String>,

    /// Only process HTML files (html, htm, shtml, dhtml).
    #[arg(short = 'H', long = "html", help_heading = "File options")]
    pub html: bool,

    /// Only process C/C++ files (c, cc, cpp, h, hpp, ...).
    #[arg(short = 'C', long = "c-files", help_heading = "File options")]
    pub c_files: bool,

    /// Continue with the next file after an error instead of aborting.
    #[arg(short = 'E', long, help_heading = "File options")]
    pub ignore_errors: bool,

    // Matching options.
    /// Ignore case.
    #[arg(short, long, help_heading = "Matching options")]
    pub ignore_case: bool,

    /// Match patterns as plain strings, not as regular expressions.
    #[arg(short = 'x', long = "no-regex", visible_alias = "literal", help_heading = "Matching options")]
    pub literal: bool,

    /// Match only whole words.
    #[arg(short, long = "whole-words", help_heading = "Matching options")]
    pub whole_words: bool,

    /// Separator between pattern and replacement.
    #[arg(long, value_name = "SEP", default_value = "=", help_heading = "Matching options")]
    pub equals: String,

    /// Marker introducing back-references in replacements.
    #[arg(long, value_name = "TOKEN", default_value = "$", help_heading = "Matching options")]
    pub dollar: String,

    /// Read additional rules from a YAML file.
    #[arg(long, value_name = "FILE", help_heading = "Matching options")]
    pub rules_file: Option<PathBuf>,

    // Renaming options.
    /// Rename files and directories in addition to modifying file contents.
    #[arg(
        short = 'A',
        long = "rename",
        conflicts_with_all = ["rename_only", "modify_symlinks"],
        help_heading = "Renaming options"
    )]
    pub rename: bool,

    /// Only rename files and directories; never modify contents.
    #[arg(
        short = 'N',
        long,
        conflicts_with = "modify_symlinks",
        help_heading = "Renaming options"
    )]
    pub rename_only: bool,

    /// Modify the path symlinks point to instead of file contents or names.
    #[arg(short = 's', long, help_heading = "Renaming options")]
    pub modify_symlinks: bool,

    // Verbose and output options.
    /// Increase verbosity. `-v` prints the summary, `-vv` the rules as well.
    #[arg(short, long, action = ArgAction::Count, help_heading = "Output options")]
    pub verbose: u8,

    /// Suppress the summary and per-file messages.
    #[arg(short, long, conflicts_with = "verbose", help_heading = "Output options")]
    pub quiet: bool,

    /// Do not write or change anything.
    #[arg(short = 'd', long = "dummy-mode", short_alias = '0', help_heading = "Output options")]
    pub dummy: bool,

    /// Do not change anything; print matching lines with replacements highlighted.
    #[arg(
        short = 'P',
        long = "preview",
        visible_short_alias = 'L',
        visible_alias = "dummy-linetrace",
        help_heading = "Output options"
    )]
    pub preview: bool,

    /// Do not change anything; print matching files in full with replacements highlighted.
    #[arg(short = 'T', long = "dummy-trace", help_heading = "Output options")]
    pub trace: bool,

    /// Context lines around each change in previews. `+N` hides the line
    /// separators, a negative value shows the whole file.
    #[arg(
        long,
        value_name = "N",
        default_value = "1",
        allow_hyphen_values = true,
        help_heading = "Output options"
    )]
    pub context: PreviewContext,

    /// Summary format.
    #[arg(long, default_value = "text", value_parser = ["text", "json"], help_heading = "Output options")]
    pub format: String,

    /// Show a progress bar on stderr.
    #[arg(long, help_heading = "Output options")]
    pub progress: bool,

    /// Settings file (highlight sequences). Defaults to `~/.config/streplace/config.yaml`.
    #[arg(long, value_name = "FILE", env = "STREPLACE_CONFIG", help_heading = "Output options")]
    pub config: Option<PathBuf>,
}

/// Everything a run needs, built from the command line.
#[derive(Debug)]
pub struct Invocation {
    pub rules: Vec<Rule>,
    pub roots: Vec<PathBuf>,
    pub config: Configuration,
}

impl Args {
    fn syntax(&self) -> RuleSyntax {
        RuleSyntax {
            separator: self.equals.clone(),
            marker: self.dollar.clone(),
        }
    }

    fn flags(&self) -> RuleFlags {
        RuleFlags {
            literal: self.literal,
            ignore_case: self.ignore_case,
            whole_word: self.whole_words,
        }
    }

    fn mode(&self) -> Mode {
        if self.modify_symlinks {
            Mode::ModifySymlinkTarget
        } else if self.rename_only {
            Mode::RenameOnly
        } else if self.rename {
            Mode::ModifyAndRename
        } else {
            Mode::Modify
        }
    }

    fn execution(&self) -> Execution {
        if self.trace {
            Execution::Preview(PreviewContext::WholeFile)
        } else if self.preview {
            Execution::Preview(self.context)
        } else if self.dummy {
            Execution::Dummy
        } else {
            Execution::Live
        }
    }

    /// Splits the positional arguments into rule strings and paths.
    ///
    /// An argument is a rule if it contains the separator; arguments after
    /// `--` are always paths.
    pub fn split_positionals(&self) -> (Vec<String>, Vec<PathBuf>) {
        let (rules, paths): (Vec<String>, Vec<String>) = self
            .args
            .iter()
            .cloned()
            .partition(|arg| !self.equals.is_empty() && arg.contains(self.equals.as_str()));
        let mut roots: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
        roots.extend(self.paths.iter().cloned());
        (rules, roots)
    }

    /// Builds the configuration without the rules.
    pub fn configuration(&self) -> Result<Configuration> {
        let settings = ConfigLoader::load_settings(self.config.as_deref())?;
        let mut config = Configuration {
            syntax: self.syntax(),
            mode: self.mode(),
            execution: self.execution(),
            recursive: self.recursive,
            follow_links: self.follow_links,
            include_all: self.all,
            extensions: None,
            error_policy: if self.ignore_errors {
                ErrorPolicy::Continue
            } else {
                ErrorPolicy::Abort
            },
            verbose: self.verbose,
            quiet: self.quiet,
            format: OutputFormat::from(self.format.as_str()),
            highlight: settings.highlight,
            progress: self.progress,
        };

        if !self.only.is_empty() {
            config.add_extensions(self.only.iter().map(String::as_str));
        }
        if self.html {
            config.add_extensions(HTML_EXTENSIONS.iter().copied());
        }
        if self.c_files {
            config.add_extensions(C_EXTENSIONS.iter().copied());
        }
        Ok(config)
    }

    /// Compiles the rules and builds the configuration for a run.
    pub fn into_invocation(self) -> Result<Invocation> {
        if self.equals.is_empty() {
            return Err(Error::Config("The separator given with --equals must not be empty".into()));
        }
        let mut config = self.configuration()?;
        let syntax = self.syntax();
        let flags = self.flags();
        let (rule_args, roots) = self.split_positionals();

        let mut rules = rule_args
            .iter()
            .map(|rule| Rule::parse(rule, &syntax, flags))
            .collect::<Result<Vec<_>>>()?;

        if let Some(path) = &self.rules_file {
            let file = ConfigLoader::load_rules_file(path)?;
            rules.extend(file.compile(&syntax, flags)?);
            if let Some(extensions) = &file.extensions {
                config.add_extensions(extensions.iter().map(String::as_str));
            }
        }

        if rules.is_empty() {
            return Err(Error::Config(format!(
                "No rules given. A rule looks like PATTERN{}REPLACEMENT",
                syntax.separator
            )));
        }
        if roots.is_empty() {
            return Err(Error::Config("No files or directories given".into()));
        }

        Ok(Invocation {
            rules,
            roots,
            config,
        })
    }
}

/// Parses command-line arguments and returns the populated `Args` struct.
pub fn parse_args() -> Args {
    Args::parse()
}
