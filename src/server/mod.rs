//! Network server: accept loop, client lifecycle, and driver control.
//!
//! - [`Driver`] - start/stop surface and server slot
//! - [`ClientLink`] - handler path's view of one client
//! - `ClientContext` - per-client state with ordered teardown
//! - `ClientRegistry` - active clients and the dead-client queue

mod accept;
mod client;
mod control;
mod link;
mod registry;
mod worker;

pub(crate) use client::ClientContext;

pub use accept::ClientFilter;
pub use control::{bind_socket, Driver, DriverBuilder};
pub use link::{ClientLink, PeerInfo};
pub use registry::ClientCounts;
