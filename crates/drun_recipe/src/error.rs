//! Error types for loading and validating specifications.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found; tried: {}", .candidates.join(", "))]
    NotFound { candidates: Vec<String> },

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML syntax error in `{path}`: {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {message}")]
    Validation { message: String },

    #[error("include error for `{pattern}`: {message}")]
    Include { pattern: String, message: String },
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn include(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Include {
            pattern: pattern.into(),
            message: message.into(),
        }
    }
}
