//! Errors raised while loading, saving and checking run configurations.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::validation::ValidationError;

/// Errors from run configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read run configuration '{path}': {source}")]
    ReadFile {
        /// File that was opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("cannot write run configuration '{path}': {source}")]
    WriteFile {
        /// File that was written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directory holding the file could not be created.
    #[error("cannot create directory '{path}': {source}")]
    CreateDir {
        /// Directory that was created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The text is not a run configuration.
    #[error("invalid run configuration{}: {source}", origin(.path.as_deref()))]
    Parse {
        /// File the text came from, if any.
        path: Option<PathBuf>,
        /// TOML decoding error.
        #[source]
        source: toml::de::Error,
    },

    /// The configuration could not be rendered as TOML.
    #[error("cannot render run configuration: {0}")]
    Render(#[from] toml::ser::Error),

    /// Values the effects would not accept as given.
    #[error("run configuration rejected: {0}")]
    Validation(#[from] ValidationError),
}

fn origin(path: Option<&Path>) -> String {
    path.map(|p| format!(" '{}'", p.display()))
        .unwrap_or_default()
}

impl ConfigError {
    /// Read failure for `path`.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Write failure for `path`.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Directory creation failure for `path`.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Decoding failure, optionally tied to the file it came from.
    pub fn parse(path: Option<&Path>, source: toml::de::Error) -> Self {
        ConfigError::Parse {
            path: path.map(Path::to_path_buf),
            source,
        }
    }
}
