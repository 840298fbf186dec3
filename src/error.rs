//! Error types and handling for the charger throttle
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for sevc operations
pub type Result<T> = std::result::Result<T, SevcError>;

/// Main error type for sevc
#[derive(Debug, Error)]
pub enum SevcError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// D-Bus communication errors
    #[error("D-Bus error: {message}")]
    DBus { message: String },

    /// Network-related errors (HTTP requests to the station)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Station replied with something we cannot interpret
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// MQTT broker errors
    #[error("MQTT error: {message}")]
    Mqtt { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Snapshot channel closed or full
    #[error("Channel error: {message}")]
    Channel { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl SevcError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        SevcError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        SevcError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new D-Bus error
    pub fn dbus<S: Into<String>>(message: S) -> Self {
        SevcError::DBus {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        SevcError::Network {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        SevcError::Protocol {
            message: message.into(),
        }
    }

    /// Create a new MQTT error
    pub fn mqtt<S: Into<String>>(message: S) -> Self {
        SevcError::Mqtt {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        SevcError::Serialization {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        SevcError::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        SevcError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new channel error
    pub fn channel<S: Into<String>>(message: S) -> Self {
        SevcError::Channel {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        SevcError::Generic {
            message: message.into(),
        }
    }

    /// Prefix the message with what we were doing when it failed
    pub fn context(self, what: &str) -> Self {
        match self {
            SevcError::Config { message } => SevcError::config(format!("{}: {}", what, message)),
            SevcError::Validation { field, message } => SevcError::Validation {
                field,
                message: format!("{}: {}", what, message),
            },
            SevcError::DBus { message } => SevcError::dbus(format!("{}: {}", what, message)),
            SevcError::Network { message } => SevcError::network(format!("{}: {}", what, message)),
            SevcError::Protocol { message } => {
                SevcError::protocol(format!("{}: {}", what, message))
            }
            SevcError::Mqtt { message } => SevcError::mqtt(format!("{}: {}", what, message)),
            SevcError::Serialization { message } => {
                SevcError::serialization(format!("{}: {}", what, message))
            }
            SevcError::Io { message } => SevcError::io(format!("{}: {}", what, message)),
            SevcError::Timeout { message } => SevcError::timeout(format!("{}: {}", what, message)),
            SevcError::Channel { message } => SevcError::channel(format!("{}: {}", what, message)),
            SevcError::Generic { message } => SevcError::generic(format!("{}: {}", what, message)),
        }
    }
}

impl From<std::io::Error> for SevcError {
    fn from(err: std::io::Error) -> Self {
        SevcError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for SevcError {
    fn from(err: serde_yaml::Error) -> Self {
        SevcError::serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SevcError {
    fn from(err: serde_json::Error) -> Self {
        SevcError::serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SevcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SevcError::protocol(err.to_string())
        } else if err.is_timeout() {
            SevcError::timeout(err.to_string())
        } else {
            SevcError::network(err.to_string())
        }
    }
}

impl From<zbus::Error> for SevcError {
    fn from(err: zbus::Error) -> Self {
        SevcError::dbus(err.to_string())
    }
}

impl From<zbus::zvariant::Error> for SevcError {
    fn from(err: zbus::zvariant::Error) -> Self {
        SevcError::dbus(format!("decoding variant: {}", err))
    }
}

impl From<rumqttc::ClientError> for SevcError {
    fn from(err: rumqttc::ClientError) -> Self {
        SevcError::mqtt(err.to_string())
    }
}
