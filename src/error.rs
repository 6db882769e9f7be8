//! Error types for xbee-net.

use thiserror::Error;

/// Main error type for all xbee-net operations.
#[derive(Debug, Error)]
pub enum XbeeNetError {
    /// A required argument or piece of state was absent.
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    /// An argument was out of range or the call is not valid in the current state.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A buffer or pool could not be allocated.
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the byte stream. This is a signal, not a failure.
    #[error("End of stream")]
    EndOfStream,

    /// A worker task could not be spawned or joined.
    #[error("Worker failure: {0}")]
    ThreadFailure(String),

    /// Configuration could not be parsed or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// The outbound queue of a client is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - outbound queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Anything that does not fit the categories above.
    #[error("Unknown failure: {0}")]
    Unknown(String),
}

impl XbeeNetError {
    /// True for the end-of-stream signal.
    #[inline]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, XbeeNetError::EndOfStream)
    }
}

/// Result type alias using XbeeNetError.
pub type Result<T> = std::result::Result<T, XbeeNetError>;
