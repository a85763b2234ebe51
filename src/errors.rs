use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in `streplace`.
///
/// Configuration errors (bad rules, bad config files) abort a run before any
/// file is touched. Everything carrying a path is a per-target error and is
/// subject to the run's [`ErrorPolicy`](crate::config::ErrorPolicy).
#[derive(Error, Debug)]
pub enum Error {
    /// A rule argument that does not contain an unescaped separator.
    #[error("Rule \"{rule}\" must contain the separator '{separator}'. Escape verbatim separators with a backslash.")]
    MalformedRule { rule: String, separator: String },

    /// The pattern half of a rule failed to compile as a regular expression.
    #[error("Invalid pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A replacement refers to a capture group the pattern does not have.
    ///
    /// Only ever reported as a warning; expansion treats the group as empty.
    #[error("Back-reference {index} exceeds the {groups} capture group(s) of \"{pattern}\"")]
    BackReferenceOutOfRange {
        pattern: String,
        index: usize,
        groups: usize,
    },

    /// A file, directory or symlink could not be read.
    #[error("Can't read '{}': {source}", path.display())]
    PathUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file, directory or symlink could not be written, renamed or replaced.
    #[error("Can't write '{}': {source}", path.display())]
    PathUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The new name of a rename operation already exists.
    #[error("Name clash while renaming '{}' as '{}', not renamed", from.display(), to.display())]
    RenameCollision { from: PathBuf, to: PathBuf },

    /// Applying the rules to a basename produced something that is not a valid name.
    #[error("Can't rename '{}': invalid new name '{name}'", path.display())]
    InvalidName { path: PathBuf, name: String },

    /// A general configuration-related error.
    #[error("Config error: {0}")]
    Config(String),

    /// An error that occurred while parsing a YAML configuration file.
    #[error("Config parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An error related to JSON serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error without a path. Filesystem errors on targets always carry
    /// their path, so this is a failure to write the run's own output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for errors that end a run under any error policy: a bad
    /// configuration, or output that can no longer be written.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MalformedRule { .. }
                | Error::InvalidPattern { .. }
                | Error::Config(_)
                | Error::Yaml(_)
                | Error::Json(_)
                | Error::Io(_)
        )
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PathUnreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unwritable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PathUnwritable {
            path: path.into(),
            source,
        }
    }
}

/// A convenient type alias for `Result<T, streplace::errors::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Config(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Config(s.to_string())
    }
}
