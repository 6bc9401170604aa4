//! Error types for the ui-target-core library.
//!
//! Geometry and hierarchy-parse anomalies never show up here: they are
//! absorbed where they happen. What remains are the failures a caller has to
//! see: the device channel, the optical engine, and bad requests.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur within the ui-target-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing keys, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A device command failed to run or returned unusable output.
    #[error("Device capture failed: {0}")]
    Capture(String),

    /// A device command did not finish within its time budget.
    #[error("Command `{command}` timed out after {}s", .after.as_secs_f32())]
    Timeout { command: String, after: Duration },

    /// The optical text recognizer could not be initialized.
    #[error("Optical detection unavailable: {0}")]
    DetectionUnavailable(String),

    /// Targeting request with zero or several keys.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Request named a tool the service does not offer.
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    /// Detection mode string not in `tree`, `optical`, `auto`.
    #[error("Unknown detection mode '{0}' (expected tree, optical or auto)")]
    UnknownMode(String),

    /// Image decoding or encoding failed.
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

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

    /// Creates a capture error with the given message.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Creates an image processing error with the given message.
    pub fn image(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    /// Creates an optical-engine availability error with the given message.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::DetectionUnavailable(msg.into())
    }

    /// Creates a usage error for a malformed targeting request.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// True for failures of the device command channel.
    pub fn is_channel_failure(&self) -> bool {
        matches!(self, Self::Capture(_) | Self::Timeout { .. } | Self::Io(_))
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
