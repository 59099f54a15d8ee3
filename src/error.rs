//! Error types and handling for the arbiter
//!
//! The core never lets an error escape a control cycle: telemetry, admission
//! and actuator failures are logged and resolved to the conservative outcome.
//! These types carry the failure up to the point where that decision is made.

use thiserror::Error;

/// Result type alias for arbiter operations
pub type Result<T> = std::result::Result<T, ArbiterError>;

/// Main error type for the arbiter
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Missing or non-numeric telemetry
    #[error("Telemetry error: {message}")]
    Telemetry { message: String },

    /// Physical or virtual switch dispatch failed
    #[error("Actuator error: {message}")]
    Actuator { message: String },

    /// A virtual actuator event handler failed
    #[error("Handler error: {message}")]
    Handler { message: String },

    /// Budget or phase computation could not be completed
    #[error("Admission error: {message}")]
    Admission { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl ArbiterError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ArbiterError::Config {
            message: message.into(),
        }
    }

    /// Create a new telemetry error
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        ArbiterError::Telemetry {
            message: message.into(),
        }
    }

    /// Create a new actuator error
    pub fn actuator<S: Into<String>>(message: S) -> Self {
        ArbiterError::Actuator {
            message: message.into(),
        }
    }

    /// Create a new handler error
    pub fn handler<S: Into<String>>(message: S) -> Self {
        ArbiterError::Handler {
            message: message.into(),
        }
    }

    /// Create a new admission error
    pub fn admission<S: Into<String>>(message: S) -> Self {
        ArbiterError::Admission {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        ArbiterError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ArbiterError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        ArbiterError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ArbiterError {
    fn from(err: std::io::Error) -> Self {
        ArbiterError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ArbiterError {
    fn from(err: serde_yaml::Error) -> Self {
        ArbiterError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ArbiterError {
    fn from(err: serde_json::Error) -> Self {
        ArbiterError::Serialization {
            message: err.to_string(),
        }
    }
}
