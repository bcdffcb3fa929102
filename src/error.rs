//! Error types for Kiln
//!
//! All modules use `KilnResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in Kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Repository errors
    #[error("Image not found: {name} (repository: {repo})")]
    NotFound { name: String, repo: String },

    #[error("Operation timed out: {operation} (repository: {repo})")]
    Timeout { operation: String, repo: String },

    #[error("Transfer failed (repository: {repo}): {reason}")]
    TransferFailed { repo: String, reason: String },

    #[error("Corrupt metadata at {path}: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    // Build errors
    #[error("Build failed for image {name}: {reason}")]
    BuildFailed { name: String, reason: String },

    #[error("Invalid image name: {name}: {reason}")]
    InvalidImageName { name: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Unknown configuration section [{section}] (remote repositories use [<id>-repo])")]
    UnknownSection { section: String },

    #[error("Remote repository not configured: {0}")]
    RepoNotConfigured(String),

    #[error("No build command configured")]
    BuilderNotConfigured,

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a transfer failure for a repository
    pub fn transfer_failed(repo: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            repo: repo.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error for a repository operation
    pub fn timeout(operation: impl Into<String>, repo: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            repo: repo.into(),
        }
    }

    /// Create a build failure naming the image
    pub fn build_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BuildFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Retryable errors are transient transfer conditions; everything else
    /// is terminal for the operation that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::TransferFailed { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RepoNotConfigured(_) => {
                Some("Add a [<id>-repo] section to config.toml. See: kiln config path")
            }
            Self::BuilderNotConfigured => Some("Set [build] command in config.toml"),
            Self::UnknownSection { .. } => {
                Some("Remote repository sections must be named [<id>-repo]")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_artifact_and_repo() {
        let err = KilnError::NotFound {
            name: "base".to_string(),
            repo: "prod".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("base"));
        assert!(msg.contains("prod"));
    }

    #[test]
    fn error_retryable() {
        assert!(KilnError::timeout("pull", "prod").is_retryable());
        assert!(KilnError::transfer_failed("prod", "connection reset").is_retryable());
        assert!(!KilnError::build_failed("base", "exit 1").is_retryable());
        assert!(!KilnError::NotFound {
            name: "base".to_string(),
            repo: "local".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn error_hint() {
        let err = KilnError::RepoNotConfigured("prod".to_string());
        assert!(err.hint().is_some());
        assert!(KilnError::Internal("x".to_string()).hint().is_none());
    }
}
