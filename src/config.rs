//! Server configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```
//! use xbee_net::ServerConfig;
//!
//! let config = ServerConfig::from_json(r#"{ "listen_backlog": 64 }"#).unwrap();
//! assert_eq!(config.listen_backlog, 64);
//! assert_eq!(config.accept_retry_delay_ms, 5);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XbeeNetError};
use crate::writer::WriterConfig;

/// Default `listen` backlog.
pub const DEFAULT_LISTEN_BACKLOG: i32 = 512;

/// Default pause before retrying an accept on a socket that is not yet listening.
pub const DEFAULT_ACCEPT_RETRY_DELAY_MS: u64 = 5;

/// Default capacity of the receive → handler frame channel.
pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 256;

/// Default size of each receive buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Default number of idle receive buffers kept per client.
pub const DEFAULT_MAX_IDLE_BUFFERS: usize = 4;

/// Tunables for a network server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Backlog passed to `listen`.
    pub listen_backlog: i32,
    /// Sleep between accept retries while the socket is not yet listening.
    pub accept_retry_delay_ms: u64,
    /// Frames buffered between a client's receive and handler workers.
    pub frame_queue_capacity: usize,
    /// Capacity of each receive buffer.
    pub read_buffer_size: usize,
    /// Idle receive buffers kept per client.
    pub max_idle_buffers: usize,
    /// Outbound queue settings.
    pub writer: WriterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            accept_retry_delay_ms: DEFAULT_ACCEPT_RETRY_DELAY_MS,
            frame_queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_idle_buffers: DEFAULT_MAX_IDLE_BUFFERS,
            writer: WriterConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// - `Json` if the text is not a valid config document.
    /// - `Config` if the values fail [`ServerConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config
            .validate()
            .map_err(|e| XbeeNetError::Config(format!("server config rejected: {}", e)))?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.listen_backlog <= 0 {
            return Err(XbeeNetError::InvalidArgument(format!(
                "listen_backlog must be positive, got {}",
                self.listen_backlog
            )));
        }
        let capacities = [
            ("frame_queue_capacity", self.frame_queue_capacity),
            ("read_buffer_size", self.read_buffer_size),
            ("writer.max_pending_frames", self.writer.max_pending_frames),
            ("writer.channel_capacity", self.writer.channel_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(XbeeNetError::InvalidArgument(format!(
                    "{} must be non-zero",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Accept retry delay as a `Duration`.
    #[inline]
    pub fn accept_retry_delay(&self) -> Duration {
        Duration::from_millis(self.accept_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_backlog, 512);
        assert_eq!(config.accept_retry_delay(), Duration::from_millis(5));
        assert_eq!(config.frame_queue_capacity, 256);
        assert_eq!(config.writer.max_pending_frames, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_empty_object() {
        let config = ServerConfig::from_json("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_from_json_nested_writer() {
        let config = ServerConfig::from_json(
            r#"{ "frame_queue_capacity": 8, "writer": { "backpressure_timeout_ms": 250 } }"#,
        )
        .unwrap();
        assert_eq!(config.frame_queue_capacity, 8);
        assert_eq!(
            config.writer.backpressure_timeout(),
            Duration::from_millis(250)
        );
        assert_eq!(config.writer.channel_capacity, 1024);
    }

    #[test]
    fn test_from_json_malformed() {
        let err = ServerConfig::from_json("{ listen_backlog: }").unwrap_err();
        assert!(matches!(err, XbeeNetError::Json(_)));
    }

    #[test]
    fn test_from_json_rejects_zero_capacity() {
        let err = ServerConfig::from_json(r#"{ "frame_queue_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, XbeeNetError::Config(_)));
        assert!(err.to_string().contains("frame_queue_capacity"));
    }

    #[test]
    fn test_validate_backlog() {
        let config = ServerConfig {
            listen_backlog: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(XbeeNetError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ServerConfig {
            max_idle_buffers: 1,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ServerConfig::from_json(&json).unwrap(), config);
    }
}
