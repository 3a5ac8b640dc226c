//! Error types for the storyface-core library.
//!
//! Validation errors are raised synchronously before any network traffic.
//! Service and transport errors carry enough context to derive the single
//! user-visible message shown by the presentation layer.

use thiserror::Error;

/// Errors that can occur within the storyface-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing keys, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Submission attempted without a primary photo.
    #[error("Please choose a photo to personalize.")]
    NoPhoto,

    /// Submission attempted with neither a template image nor a prompt.
    #[error("Please provide either a template image or a custom prompt.")]
    MissingStyle,

    /// A selected or dropped file does not declare an image media type.
    #[error("Please drop a valid image file.")]
    InvalidImageType(String),

    /// The service answered with a non-success status.
    #[error("Service returned {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Service {
        status: u16,
        /// Message extracted from the response body, if the service sent one.
        message: Option<String>,
    },

    /// The service answered 2xx but the body was not what we expected.
    #[error("Malformed service response: {0}")]
    MalformedResponse(String),

    /// The job this response belongs to is no longer live.
    #[error("Job {0} was superseded")]
    Superseded(String),

    /// Opening the result in a viewer failed.
    #[error("Viewer error: {0}")]
    Viewer(String),

    /// Transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A service or result address could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a malformed-response error with the given message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Creates a viewer error with the given message.
    pub fn viewer(msg: impl Into<String>) -> Self {
        Self::Viewer(msg.into())
    }

    /// Returns `true` for errors raised before any request was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoPhoto | Self::MissingStyle | Self::InvalidImageType(_)
        )
    }

    /// The message the service itself supplied, if any.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            Self::Service {
                message: Some(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        }
    }

    /// User-visible message: the service's own words when present,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.service_message()
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
