//! Connection-type tables.
//!
//! A [`Mode`] is a static list of the connection types a link understands.
//! Each client interface holds a [`ModeTable`] that is filled once, right
//! after accept, from [`NET_SERVER_MODE`].

use crate::error::{Result, XbeeNetError};

/// One kind of logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConType {
    /// Routing id, the first byte of every packet of this type.
    pub id: u8,
    /// Human-readable name used to create connections.
    pub name: &'static str,
    /// True if packets carry an endpoint byte after the type id.
    pub endpoints: bool,
}

/// A named set of connection types.
#[derive(Debug, PartialEq, Eq)]
pub struct Mode {
    /// Mode name.
    pub name: &'static str,
    /// Connection types offered by this mode.
    pub con_types: &'static [ConType],
}

/// Connection types available to a network client.
pub static NET_SERVER_MODE: Mode = Mode {
    name: "net_server",
    con_types: &[
        ConType { id: 0x00, name: "Backchannel", endpoints: true },
        ConType { id: 0x01, name: "Data", endpoints: true },
        ConType { id: 0x02, name: "Local AT", endpoints: false },
        ConType { id: 0x03, name: "Remote AT", endpoints: false },
        ConType { id: 0x04, name: "Modem Status", endpoints: false },
        ConType { id: 0x05, name: "Transmit Status", endpoints: false },
        ConType { id: 0x06, name: "I/O", endpoints: false },
    ],
};

/// The connection types installed on one interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeTable {
    mode: Option<&'static Mode>,
}

impl ModeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `mode`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a mode is already installed.
    pub fn import(&mut self, mode: &'static Mode) -> Result<()> {
        if let Some(current) = self.mode {
            return Err(XbeeNetError::InvalidArgument(format!(
                "connection types already imported from mode '{}'",
                current.name
            )));
        }
        self.mode = Some(mode);
        Ok(())
    }

    /// Name of the installed mode.
    pub fn mode_name(&self) -> Option<&'static str> {
        self.mode.map(|m| m.name)
    }

    /// All installed connection types, empty before import.
    pub fn con_types(&self) -> &'static [ConType] {
        self.mode.map(|m| m.con_types).unwrap_or(&[])
    }

    /// Look up a connection type by name.
    pub fn by_name(&self, name: &str) -> Option<&'static ConType> {
        self.con_types().iter().find(|t| t.name == name)
    }

    /// Look up a connection type by routing id.
    pub fn by_id(&self, id: u8) -> Option<&'static ConType> {
        self.con_types().iter().find(|t| t.id == id)
    }

    /// True before a mode has been imported.
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
    }

    /// Forget the installed mode.
    pub fn clear(&mut self) {
        self.mode = None;
    }
}
