//! Error types for the keyword relay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Keyword policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors. All of them are fatal at bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Keyword policy construction errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Keyword policy is empty")]
    Empty,

    #[error("Failed to compile keyword {keyword:?}: {source}")]
    Compile {
        keyword: String,
        #[source]
        source: regex::Error,
    },
}

/// Chat platform adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },
}

/// Failure to deliver a forward to the sink.
///
/// None of these stop the dispatcher; they are reported and the forward is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Sink {sink} is unavailable")]
    SinkUnavailable { sink: String },

    #[error("Permission denied sending to sink {sink}")]
    PermissionDenied { sink: String },

    #[error("Delivery to sink {sink} failed: {reason}")]
    Transient { sink: String, reason: String },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
