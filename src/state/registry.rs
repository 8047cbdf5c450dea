//! The authoritative set of Open connections.
//!
//! # Thread Safety
//!
//! All mutations go through one `parking_lot::RwLock`, so `add`/`remove`
//! are mutually exclusive. `snapshot` copies the membership out under the
//! read lock: the result is a set that existed at a single instant, and
//! delivery iterates it with no lock held.

use crate::error::RegistryError;
use crate::state::{Connection, ConnectionId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mapping from connection id to every currently Open connection.
pub struct Registry {
    connections: RwLock<BTreeMap<ConnectionId, Arc<Connection>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert an Open connection keyed by its id.
    #[cfg(test)]
    pub fn add(&self, conn: Arc<Connection>) -> Result<(), RegistryError> {
        self.add_with(conn, |_| {})
    }

    /// Insert a connection and run `on_added` before any other registry
    /// operation can observe it.
    ///
    /// `on_added` runs under the write lock. It must not call back into the
    /// registry and must not block; enqueueing onto the new connection's
    /// outbound queue is the intended use.
    pub fn add_with<F>(&self, conn: Arc<Connection>, on_added: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&Arc<Connection>),
    {
        let id = conn.id();
        if !conn.is_open() {
            return Err(RegistryError::NotOpen(id));
        }

        let mut connections = self.connections.write();
        if connections.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        on_added(&conn);
        connections.insert(id, conn);
        Ok(())
    }

    /// Remove a connection. Removing an absent id is a no-op.
    ///
    /// Returns the removed entry, if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.write().remove(&id)
    }

    /// Point-in-time list of open connections, ordered by id.
    ///
    /// Entries that began closing but have not been removed yet are left
    /// out, so an evicted recipient never shows up in a later broadcast.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .values()
            .filter(|conn| conn.is_open())
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Tear the registry down at server stop.
    ///
    /// Empties the map and asks every former member to close. Each
    /// Dispatcher then releases its own transport. Returns how many
    /// connections were closed.
    pub fn close_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.connections.write());
        for conn in drained.values() {
            conn.close_with("server shutdown");
        }
        drained.len()
    }
}
