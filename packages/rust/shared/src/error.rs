//! Error types for chapterquiz.
//!
//! Library crates use [`QuizError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all chapterquiz operations.
///
/// Every workflow step reports failure through one of these kinds; the graph
/// engine stops at the first one it sees.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    /// Malformed or conflicting request input.
    #[error("input error: {message}")]
    Input { message: String },

    /// Object storage locator could not be parsed or fetched.
    #[error("storage error: {0}")]
    Storage(String),

    /// A required identifier or setting is missing.
    #[error("config error: {message}")]
    Config { message: String },

    /// Model call or model output failure at book level.
    #[error("generation error: {0}")]
    Generation(String),

    /// Question store or chunk index read/write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// No record exists for the requested key.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// A grading batch references data that does not exist.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Graph compilation or routing fault inside the workflow engine.
    #[error("workflow error: {0}")]
    Workflow(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuizError>;

impl QuizError {
    /// Create an input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input_error",
            Self::Storage(_) => "storage_error",
            Self::Config { .. } => "config_error",
            Self::Generation(_) => "generation_error",
            Self::Persistence(_) => "persistence_error",
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation_error",
            Self::Io { .. } => "io_error",
            Self::Workflow(_) => "workflow_error",
        }
    }

    /// Whether the caller can fix this by changing the request.
    ///
    /// Collaborator, storage and model failures are internal.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::Input { .. } | Self::Config { .. } | Self::NotFound { .. } | Self::Validation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = QuizError::input("Provide either an uploaded file or an S3 URL, not both");
        assert_eq!(
            err.to_string(),
            "input error: Provide either an uploaded file or an S3 URL, not both"
        );

        let err = QuizError::validation("Invalid question_id: 999");
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn client_faults_are_classified() {
        assert!(QuizError::input("x").is_client_fault());
        assert!(QuizError::validation("x").is_client_fault());
        assert!(QuizError::not_found("x").is_client_fault());
        assert!(!QuizError::Storage("x".into()).is_client_fault());
        assert!(!QuizError::Generation("x".into()).is_client_fault());
        assert!(!QuizError::Persistence("x".into()).is_client_fault());
    }

    #[test]
    fn kind_names() {
        assert_eq!(QuizError::Workflow("x".into()).kind(), "workflow_error");
        assert_eq!(QuizError::not_found("x").kind(), "not_found");
    }
}
