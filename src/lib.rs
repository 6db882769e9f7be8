//! # xbee-net
//!
//! TCP transport and connection multiplexing for XBee radio drivers.
//!
//! A driver shares one radio module with network clients. Each accepted
//! client gets its own framed byte stream, a set of backchannel system
//! connections, and room for application ("frontchannel") connections, all
//! multiplexed over the same socket.
//!
//! ## Architecture
//!
//! - **Framing**: `0x7E`, 16-bit big-endian length, payload
//! - **Routing**: `[type id][endpoint][data]` inside each payload
//! - **Per client**: receive, handler, and transmit workers with ordered
//!   teardown; clients that hang up are reaped by the accept loop
//!
//! ## Example
//!
//! ```no_run
//! use xbee_net::Driver;
//!
//! #[tokio::main]
//! async fn main() -> xbee_net::Result<()> {
//!     let driver = Driver::new();
//!     driver.net_start(27015, None).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     driver.net_stop().await
//! }
//! ```

pub mod backchannel;
pub mod codec;
pub mod config;
pub mod conn;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod writer;

pub use config::ServerConfig;
pub use error::{Result, XbeeNetError};
pub use handler::{CallbackContext, ConnectionRouter, FrameHandler};
pub use protocol::Frame;
pub use server::{
    bind_socket, ClientCounts, ClientFilter, ClientLink, Driver, DriverBuilder, PeerInfo,
};
