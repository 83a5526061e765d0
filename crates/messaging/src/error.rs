//! Messaging error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while encoding or decoding an envelope.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors raised by a broker transport.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),
}

/// Errors returned by [`EventPublisher::publish`](crate::EventPublisher::publish).
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Broker(#[from] BusError),

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of a single inbound handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] CodecError),

    #[error("{0}")]
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps any error raised while applying a message.
    pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HandlerError::Failed(err.into())
    }
}
