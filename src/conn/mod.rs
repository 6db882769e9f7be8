//! Logical connections, connection types, and packet routing.
//!
//! - [`ModeTable`] / [`NET_SERVER_MODE`] - which connection types a client
//!   may use
//! - [`ConnectionTable`] - the logical connections of one client
//! - [`Packet`] - the routing prefix inside each frame payload

mod connection;
mod mode;
mod packet;

pub use connection::{
    ConAddress, ConCallback, Connection, ConnectionHandle, ConnectionTable, UserData,
};
pub use mode::{ConType, Mode, ModeTable, NET_SERVER_MODE};
pub use packet::Packet;
