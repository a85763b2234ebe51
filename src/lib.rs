//! `streplace` replaces strings in file contents, file and directory names,
//! and symlink targets, in place and optionally recursively.
//!
//! It provides the core logic for the `streplace` command-line tool but can
//! also be used as a library. The main components are:
//!
//! - `patterns`: compiles `PATTERN=REPLACEMENT` rules into a [`Rule`].
//! - `matcher` and `template`: find non-overlapping matches (literal or
//!   regex, optionally case-insensitive and whole-word) and expand
//!   replacements with back-references.
//! - `scanner`: lists the targets of a run in a deterministic, post-order
//!   sequence.
//! - [`Replacer`]: modifies contents, renames entries or rewrites symlinks,
//!   writing each file atomically, and returns the [`RunStats`].
//! - `output_formatter`: previews with highlighted replacements and summaries.
//! - `fs`: the filesystem seam, with a real and an in-memory implementation.
//!
//! ```no_run
//! use std::path::PathBuf;
//! use streplace::config::Configuration;
//! use streplace::fs::OsFileSystem;
//! use streplace::patterns::{Rule, RuleFlags, RuleSyntax};
//! use streplace::Replacer;
//!
//! let rule = Rule::parse("colour=color", &RuleSyntax::default(), RuleFlags::default())?;
//! let replacer = Replacer::new(vec![rule], Configuration::default());
//! let stats = replacer.run(&[PathBuf::from("README.md")], &OsFileSystem, &mut std::io::sink())?;
//! println!("{} matches", stats.matches_total);
//! # Ok::<(), streplace::Error>(())
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod file_renamer;
pub mod fs;
pub mod matcher;
pub mod output_formatter;
pub mod patterns;
pub mod replacer;
pub mod scanner;
pub mod template;

// Re-export main types for easier access by library users.
pub use config::Configuration;
pub use errors::{Error, Result};
pub use output_formatter::{OutputFormat, OutputFormatter};
pub use patterns::Rule;
pub use replacer::{Replacer, RunStats};
pub use scanner::Scanner;
