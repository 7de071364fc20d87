use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of raw response characters kept in a [`Error::MalformedResponse`].
pub const RESPONSE_EXCERPT_CHARS: usize = 500;

/// Comprehensive error types for the docgen library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Execution plan or configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// A required input (instruction file) does not exist.
    #[error("Required input not found: '{path}'")]
    InputAbsent {
        /// Missing path
        path: PathBuf,
    },

    /// No files matched the filters in the given input folders.
    #[error("No content found in input folders: {folders}")]
    NoContent {
        /// Comma-separated list of scanned folders
        folders: String,
    },

    /// The LLM transport failed.
    #[error("LLM transport error: {message}")]
    Transport {
        /// Error message
        message: String,
        /// Whether the failure is rate-limit class
        transient: bool,
    },

    /// The LLM response could not be parsed even after repair.
    #[error("Malformed LLM response: {reason}. Raw response starts with: {excerpt}")]
    MalformedResponse {
        /// Why parsing failed
        reason: String,
        /// Bounded prefix of the raw response
        excerpt: String,
    },

    /// An operation in the LLM response failed field validation.
    #[error("Invalid file operation at index {index}: {reason}")]
    OperationValidation {
        /// Index of the offending element
        index: usize,
        /// Validation failure
        reason: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// A spawned task panicked or was aborted before reporting a result.
    #[error("Task did not complete: {message}")]
    Task {
        /// Join failure description
        message: String,
    },

    /// A step failed; wraps the underlying cause.
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        /// Step name
        step: String,
        /// Underlying error
        source: Box<Error>,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a missing-input error.
    #[must_use]
    pub fn input_absent(path: impl Into<PathBuf>) -> Self {
        Self::InputAbsent { path: path.into() }
    }

    /// Creates a no-content error for the given folders.
    #[must_use]
    pub fn no_content<P: AsRef<std::path::Path>>(folders: &[P]) -> Self {
        let folders = folders
            .iter()
            .map(|f| f.as_ref().display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::NoContent { folders }
    }

    /// Creates a malformed-response error, keeping only a bounded excerpt of `raw`.
    #[must_use]
    pub fn malformed_response(reason: impl Into<String>, raw: &str) -> Self {
        let mut excerpt: String = raw.chars().take(RESPONSE_EXCERPT_CHARS).collect();
        if raw.chars().nth(RESPONSE_EXCERPT_CHARS).is_some() {
            excerpt.push_str("...");
        }
        Self::MalformedResponse {
            reason: reason.into(),
            excerpt,
        }
    }

    /// Creates an operation validation error.
    #[must_use]
    pub fn operation(index: usize, reason: impl Into<String>) -> Self {
        Self::OperationValidation {
            index,
            reason: reason.into(),
        }
    }

    /// Wraps an error with the name of the step that produced it.
    #[must_use]
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Self::StepFailed {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if retrying the failed call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { transient, .. } => *transient,
            Self::StepFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if no content was found to process.
    #[must_use]
    pub const fn is_no_content(&self) -> bool {
        matches!(self, Self::NoContent { .. })
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.is_config());
        assert!(err.to_string().contains("test message"));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("/tmp/test.txt", io_err);
        assert!(err.is_io());
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn test_malformed_response_excerpt_is_bounded() {
        let raw = "x".repeat(2_000);
        let err = Error::malformed_response("no array", &raw);

        match err {
            Error::MalformedResponse { excerpt, .. } => {
                assert_eq!(excerpt.len(), RESPONSE_EXCERPT_CHARS + 3);
                assert!(excerpt.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_short_response_excerpt_kept_whole() {
        let err = Error::malformed_response("bad", "[{");
        assert!(err.to_string().ends_with("[{"));
    }

    #[test]
    fn test_retryable_only_for_transient_transport() {
        let transient = Error::Transport {
            message: "429".to_string(),
            transient: true,
        };
        let fatal = Error::Transport {
            message: "401".to_string(),
            transient: false,
        };

        assert!(transient.is_retryable());
        assert!(!fatal.is_retryable());
        assert!(!Error::config("x").is_retryable());
        assert!(transient.in_step("docs").is_retryable());
    }

    #[test]
    fn test_step_failed_names_step() {
        let err = Error::operation(2, "missing file_path").in_step("readme");
        let message = err.to_string();
        assert!(message.contains("readme"));
        assert!(message.contains("index 2"));
    }

    #[test]
    fn test_no_content_lists_folders() {
        let err = Error::no_content(&["src", "lib"]);
        assert!(err.is_no_content());
        assert!(err.to_string().contains("src, lib"));
    }

    #[test]
    fn test_every_variant_displays_its_cause() {
        let errors = [
            Error::io("a.txt", std::io::Error::other("denied")),
            Error::config("bad plan"),
            Error::input_absent("prompt.txt"),
            Error::no_content(&["src"]),
            Error::Transport {
                message: "timeout".to_string(),
                transient: false,
            },
            Error::malformed_response("no array", "oops"),
            Error::operation(0, "missing operation"),
            Error::Serialization {
                message: "eof".to_string(),
            },
            Error::Task {
                message: "panicked".to_string(),
            },
            Error::config("inner").in_step("docs"),
        ];

        for err in errors {
            let detail = match &err {
                Error::Io { message, .. }
                | Error::Config { message }
                | Error::Transport { message, .. }
                | Error::Serialization { message }
                | Error::Task { message } => message.clone(),
                Error::InputAbsent { path } => path.display().to_string(),
                Error::NoContent { folders } => folders.clone(),
                Error::MalformedResponse { reason, .. }
                | Error::OperationValidation { reason, .. } => reason.clone(),
                Error::StepFailed { step, .. } => step.clone(),
            };
            assert!(err.to_string().contains(&detail), "{err}");
        }
    }

    #[test]
    fn test_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }
}
