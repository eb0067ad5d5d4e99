//! Error types for outline planning and rendering.

use crate::validator::Rejection;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Bad inbound values. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The topic was empty or whitespace only.
    #[error("Topic must not be empty")]
    EmptyTopic,

    /// The requested slide count is outside the configured bounds.
    #[error("Slide count {requested} is outside the allowed range {min}..={max}")]
    InvalidSlideCount { requested: i64, min: usize, max: usize },
}

/// Failures talking to the model service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No API key was configured for a client that needs one.
    #[error("API key is not set")]
    MissingApiKey,

    /// The call did not complete in time.
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-success status.
    #[error("Model service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The connection failed before a response arrived.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The response arrived but did not have the expected shape.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

impl TransportError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::MissingApiKey => false,
            TransportError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            TransportError::Timeout(_)
            | TransportError::Connection(_)
            | TransportError::MalformedResponse(_) => true,
        }
    }
}

/// The model's text could not be turned into a slide tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing but whitespace came back.
    #[error("Model response was empty")]
    Empty,

    /// The text did not follow the output format contract.
    #[error("Unparseable model response: {0}")]
    Unparseable(String),
}

/// Terminal failures of the content planner.
#[derive(Error, Debug)]
pub enum PlanningError {
    /// The request was rejected before the model was called.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The model could not be reached within the transport retry budget.
    #[error("Model unavailable after {attempts} call(s): {source}")]
    ModelUnavailable {
        attempts: u32,
        source: TransportError,
    },

    /// Every schema attempt was rejected.
    #[error("Generation failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: Rejection },

    /// The caller cancelled the request.
    #[error("Generation was cancelled")]
    Cancelled,
}

/// Structural problems that stop an outline from being rendered.
///
/// A validated outline never triggers these; they indicate a contract breach
/// upstream (or a hand-edited outline file).
#[derive(Error, Debug)]
pub enum RenderError {
    /// The outline had no slides.
    #[error("Cannot render an empty outline")]
    EmptyOutline,

    /// A slide's node tree does not map onto a title and bullet levels.
    #[error("Slide {slide} cannot be rendered: {reason}")]
    Structure { slide: usize, reason: String },

    /// Writing the package failed.
    #[error("Failed to write presentation package: {0}")]
    Package(String),
}

/// Failures loading pipeline configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for our schema.
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value parsed but is outside what the pipeline supports.
    #[error("Invalid config value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything that can end a generation request.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// The single message shown to the person who made the request.
    pub fn user_message(&self) -> String {
        match self {
            Error::Request(e) | Error::Planning(PlanningError::Request(e)) => {
                format!("Your input was invalid: {}.", e)
            }
            Error::Planning(PlanningError::ModelUnavailable { .. }) => {
                "The model is unavailable, try again.".to_string()
            }
            Error::Planning(PlanningError::Exhausted { .. }) => {
                "Generation failed after repeated attempts, try a different topic or fewer slides."
                    .to_string()
            }
            Error::Planning(PlanningError::Cancelled) => "Generation was cancelled.".to_string(),
            Error::Render(_) => {
                "An internal error prevented the presentation from being built.".to_string()
            }
            Error::Config(e) => format!("Configuration problem: {}.", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_retryability() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(TransportError::Connection("reset".into()).is_retryable());
        assert!(TransportError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(TransportError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!TransportError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!TransportError::MissingApiKey.is_retryable());
    }

    #[test]
    fn test_user_messages_distinguish_failure_classes() {
        let invalid: Error = RequestError::EmptyTopic.into();
        assert!(invalid.user_message().starts_with("Your input was invalid"));

        let nested: Error = PlanningError::Request(RequestError::EmptyTopic).into();
        assert!(nested.user_message().starts_with("Your input was invalid"));

        let unavailable: Error = PlanningError::ModelUnavailable {
            attempts: 3,
            source: TransportError::Connection("refused".into()),
        }
        .into();
        assert_eq!(unavailable.user_message(), "The model is unavailable, try again.");

        let exhausted: Error = PlanningError::Exhausted {
            attempts: 3,
            last: Rejection::Unparseable(ParseError::Empty),
        }
        .into();
        assert!(exhausted.user_message().contains("fewer slides"));
    }
}
