//! Error types shared across Tabula crates
//!
//! The taxonomy mirrors how failures reach the user:
//! - `ValidationError` is shown inline and never retried automatically
//! - `RequestFailure` is a transient notification; the user may retry
//! - `ConfigError` / `SessionError` belong to the ambient layers

use std::path::PathBuf;

/// Input rejected before any network call was made
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Prompt is empty or whitespace only
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// No dataset was selected for the report
    #[error("at least one dataset must be selected")]
    NoDatasetSelected,

    /// Plan edit addressed a step that does not exist
    #[error("step index {index} out of range (plan has {len} steps)")]
    StepIndexOutOfRange { index: usize, len: usize },

    /// Plan fails structural checks (numbering, dependencies)
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Raw JSON plan edit could not be accepted
    #[error("invalid plan JSON at `{field}`: {message}")]
    PlanJson { field: String, message: String },
}

impl ValidationError {
    /// Create a field-level JSON edit error
    pub fn plan_json(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PlanJson {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A call to an external collaborator failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestFailure {
    /// Connection, DNS, timeout or similar
    #[error("transport error: {0}")]
    Transport(String),

    /// Collaborator answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response could not be normalized into the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Collaborator processed the request and refused it
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl RequestFailure {
    /// Check if a retry has a chance of succeeding
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Malformed(_) | Self::Rejected(_) => false,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `TabulaConfig`
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Values parsed but are unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Session persistence errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Session file could not be read or written
    #[error("session storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted session could not be decoded
    #[error("corrupt session at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Operation requires a logged-in user
    #[error("no active session")]
    NotLoggedIn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_failures() {
        assert!(RequestFailure::Transport("reset".into()).is_retryable());
        assert!(RequestFailure::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!RequestFailure::Status {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!RequestFailure::Malformed("no steps".into()).is_retryable());
    }

    #[test]
    fn plan_json_error_names_field() {
        let err = ValidationError::plan_json("steps", "missing");
        assert_eq!(err.to_string(), "invalid plan JSON at `steps`: missing");
    }
}
