//! Handler module - what happens to a frame after it is received.
//!
//! Provides:
//! - [`FrameHandler`] - per-frame handler run by each client's handler worker
//! - [`ConnectionRouter`] - default handler, routes to logical connections
//! - [`CallbackContext`] - lets connection callbacks reply to the client
//!
//! # Example
//!
//! ```
//! use xbee_net::handler::FrameHandler;
//! use xbee_net::{ClientLink, Frame, XbeeNetError};
//!
//! fn assert_handler<H: FrameHandler>(_: &H) {}
//!
//! let log_len = |link: ClientLink, frame: Frame| async move {
//!     println!("{} sent {} bytes", link.peer(), frame.len());
//!     Ok::<_, XbeeNetError>(())
//! };
//! assert_handler(&log_len);
//! ```

mod context;
mod dispatch;

pub use context::CallbackContext;
pub use dispatch::{BoxFuture, ConnectionRouter, FrameHandler};
