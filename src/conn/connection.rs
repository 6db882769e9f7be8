//! Logical connections multiplexed over one client link.
//!
//! A client interface holds one [`ConnectionTable`]. Backchannel connections
//! are created right after accept; frontchannel connections can be added and
//! removed for as long as the client is alive.
//!
//! # Example
//!
//! ```
//! use xbee_net::conn::{ConAddress, ConnectionTable, NET_SERVER_MODE};
//!
//! let table = ConnectionTable::new();
//! table.import_mode(&NET_SERVER_MODE).unwrap();
//!
//! let con = table.create("Data", ConAddress::endpoint(7)).unwrap();
//! assert!(table.find(0x01, Some(7)).is_some());
//!
//! table.remove(&con).unwrap();
//! assert!(table.is_empty());
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use super::{ConType, Mode, ModeTable, Packet};
use crate::error::{Result, XbeeNetError};
use crate::handler::{BoxFuture, CallbackContext};

/// Shared handle to a connection.
pub type ConnectionHandle = Arc<Connection>;

/// Opaque per-connection user data.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Address of a logical connection within its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConAddress {
    /// Endpoint for endpoint-addressed types.
    pub endpoint: Option<u8>,
}

impl ConAddress {
    /// Address for an endpoint-addressed type.
    pub fn endpoint(endpoint: u8) -> Self {
        Self {
            endpoint: Some(endpoint),
        }
    }

    /// Address for a type without endpoints.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Callback invoked for each packet routed to a connection.
pub trait ConCallback: Send + Sync + 'static {
    /// Handle one packet.
    fn call(&self, ctx: CallbackContext, packet: Packet) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> ConCallback for F
where
    F: Fn(CallbackContext, Packet) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, ctx: CallbackContext, packet: Packet) -> BoxFuture<'static, Result<()>> {
        Box::pin((self)(ctx, packet))
    }
}

/// One logical connection.
pub struct Connection {
    con_type: &'static ConType,
    address: ConAddress,
    callback: RwLock<Option<Arc<dyn ConCallback>>>,
    user_data: RwLock<Option<UserData>>,
}

impl Connection {
    /// Connection type.
    #[inline]
    pub fn con_type(&self) -> &'static ConType {
        self.con_type
    }

    /// Address within the type.
    #[inline]
    pub fn address(&self) -> ConAddress {
        self.address
    }

    /// Bind the packet callback, replacing any previous one.
    pub fn set_callback(&self, callback: Arc<dyn ConCallback>) {
        *self
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Currently bound callback.
    pub fn callback(&self) -> Option<Arc<dyn ConCallback>> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach user data, replacing any previous value.
    pub fn set_user_data(&self, data: UserData) {
        *self
            .user_data
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(data);
    }

    /// User data downcast to `T`, if set and of that type.
    pub fn user_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self
            .user_data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        data.downcast::<T>().ok()
    }

    fn matches(&self, type_id: u8, endpoint: Option<u8>) -> bool {
        self.con_type.id == type_id && self.address.endpoint == endpoint
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("con_type", &self.con_type.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// The connection types and logical connections of one interface.
#[derive(Default)]
pub struct ConnectionTable {
    types: RwLock<ModeTable>,
    connections: RwLock<Vec<ConnectionHandle>>,
}

impl ConnectionTable {
    /// Create an empty table with no connection types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the connection types of `mode`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a mode is already installed.
    pub fn import_mode(&self, mode: &'static Mode) -> Result<()> {
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .import(mode)
    }

    /// Snapshot of the installed connection types.
    pub fn mode_table(&self) -> ModeTable {
        *self.types.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a connection of the named type.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an unknown type, an endpoint on a type without
    ///   endpoints, or an address already in use.
    /// - `MissingParameter` if an endpoint-addressed type has no endpoint.
    pub fn create(&self, type_name: &str, address: ConAddress) -> Result<ConnectionHandle> {
        let con_type = self.mode_table().by_name(type_name).ok_or_else(|| {
            XbeeNetError::InvalidArgument(format!("unknown connection type '{}'", type_name))
        })?;

        match (con_type.endpoints, address.endpoint) {
            (true, None) => return Err(XbeeNetError::MissingParameter("endpoint")),
            (false, Some(endpoint)) => {
                return Err(XbeeNetError::InvalidArgument(format!(
                    "'{}' connections take no endpoint, got {}",
                    type_name, endpoint
                )))
            }
            _ => {}
        }

        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if connections
            .iter()
            .any(|c| c.matches(con_type.id, address.endpoint))
        {
            return Err(XbeeNetError::InvalidArgument(format!(
                "'{}' connection at {:?} already exists",
                type_name, address
            )));
        }

        let con = Arc::new(Connection {
            con_type,
            address,
            callback: RwLock::new(None),
            user_data: RwLock::new(None),
        });
        connections.push(con.clone());
        Ok(con)
    }

    /// Find the connection a packet routes to.
    pub fn find(&self, type_id: u8, endpoint: Option<u8>) -> Option<ConnectionHandle> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.matches(type_id, endpoint))
            .cloned()
    }

    /// Remove a connection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the connection is not in this table.
    pub fn remove(&self, con: &ConnectionHandle) -> Result<()> {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = connections.len();
        connections.retain(|c| !Arc::ptr_eq(c, con));
        if connections.len() == before {
            return Err(XbeeNetError::InvalidArgument(
                "connection not in this table".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot of every connection.
    pub fn connections(&self) -> Vec<ConnectionHandle> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no connections exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every connection and forget the installed types.
    pub fn clear(&self) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::NET_SERVER_MODE;

    fn table() -> ConnectionTable {
        let table = ConnectionTable::new();
        table.import_mode(&NET_SERVER_MODE).unwrap();
        table
    }

    #[test]
    fn test_create_requires_imported_type() {
        let table = ConnectionTable::new();
        let err = table.create("Backchannel", ConAddress::endpoint(0)).unwrap_err();
        assert!(matches!(err, XbeeNetError::InvalidArgument(_)));
    }

    #[test]
    fn test_create_and_find() {
        let table = table();
        let con = table.create("Backchannel", ConAddress::endpoint(2)).unwrap();
        assert_eq!(con.con_type().id, 0x00);

        let found = table.find(0x00, Some(2)).unwrap();
        assert!(Arc::ptr_eq(&found, &con));
        assert!(table.find(0x00, Some(3)).is_none());
        assert!(table.find(0x01, Some(2)).is_none());
    }

    #[test]
    fn test_endpoint_rules() {
        let table = table();
        assert!(matches!(
            table.create("Data", ConAddress::none()),
            Err(XbeeNetError::MissingParameter("endpoint"))
        ));
        assert!(matches!(
            table.create("Local AT", ConAddress::endpoint(1)),
            Err(XbeeNetError::InvalidArgument(_))
        ));
        table.create("Local AT", ConAddress::none()).unwrap();
        assert!(table.find(0x02, None).is_some());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let table = table();
        table.create("Data", ConAddress::endpoint(5)).unwrap();
        assert!(table.create("Data", ConAddress::endpoint(5)).is_err());
        table.create("Data", ConAddress::endpoint(6)).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_remove() {
        let table = table();
        let con = table.create("Data", ConAddress::endpoint(1)).unwrap();
        table.remove(&con).unwrap();
        assert!(table.remove(&con).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_user_data_downcast() {
        let table = table();
        let con = table.create("Data", ConAddress::endpoint(1)).unwrap();
        assert!(con.user_data::<String>().is_none());

        con.set_user_data(Arc::new("peer".to_string()));
        assert_eq!(con.user_data::<String>().unwrap().as_str(), "peer");
        assert!(con.user_data::<u32>().is_none());
    }

    #[test]
    fn test_clear() {
        let table = table();
        table.create("Data", ConAddress::endpoint(1)).unwrap();
        table.clear();
        assert!(table.is_empty());
        assert!(table.mode_table().is_empty());
    }
}
