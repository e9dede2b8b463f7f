//! Routing module for the static backend table.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::domain::backend::{BackendId, BackendServer, MacAddr};
use crate::error::{ConfigError, ConfigResult};

/// The ordered, immutable set of backends traffic is distributed across.
///
/// Table order is significant: round-robin walks it in order and
/// least-connections breaks ties by the earliest index.
#[derive(Debug, Clone)]
pub struct BackendTable {
    backends: Vec<BackendServer>,
}

impl BackendTable {
    /// Build a table from `(address, mac, port)` triples, assigning IDs in order.
    ///
    /// Fails on an empty table or when an address appears twice.
    pub fn new<I>(entries: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (Ipv4Addr, MacAddr, u16)>,
    {
        let mut backends: Vec<BackendServer> = Vec::new();

        for (address, mac, port) in entries {
            if backends.iter().any(|b| b.address == address) {
                return Err(ConfigError::DuplicateBackend(address));
            }
            let id = BackendId(backends.len() as u32);
            backends.push(BackendServer::new(id, address, mac, port));
        }

        if backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        Ok(Self { backends })
    }

    /// Number of configured backends (always at least one).
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; an empty table cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backend at a table index.
    pub fn get(&self, index: usize) -> Option<&BackendServer> {
        self.backends.get(index)
    }

    /// Find the backend owning a network address.
    pub fn find_by_address(&self, address: Ipv4Addr) -> Option<&BackendServer> {
        self.backends.iter().find(|b| b.address == address)
    }

    /// Whether an address belongs to a configured backend.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        self.find_by_address(address).is_some()
    }

    /// Iterate backends in table order.
    pub fn iter(&self) -> std::slice::Iter<'_, BackendServer> {
        self.backends.iter()
    }

    /// All backends as a slice, in table order.
    pub fn as_slice(&self) -> &[BackendServer] {
        &self.backends
    }
}

impl<'a> IntoIterator for &'a BackendTable {
    type Item = &'a BackendServer;
    type IntoIter = std::slice::Iter<'a, BackendServer>;

    fn into_iter(self) -> Self::IntoIter {
        self.backends.iter()
    }
}

/// A shared reference to the backend table.
pub type SharedBackendTable = Arc<BackendTable>;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(last: u8) -> (Ipv4Addr, MacAddr, u16) {
        (
            Ipv4Addr::new(10, 0, 0, last),
            MacAddr::new(0, 0, 0, 0, 0, last),
            u16::from(last),
        )
    }

    #[test]
    fn test_table_assigns_ids_in_order() {
        let table = BackendTable::new([entry(1), entry(2), entry(3)]).unwrap();
        assert_eq!(table.len(), 3);
        let ids: Vec<u32> = table.iter().map(|b| b.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(table.get(1).unwrap().address, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_lookup_by_address() {
        let table = BackendTable::new([entry(1), entry(2)]).unwrap();
        assert_eq!(table.find_by_address(Ipv4Addr::new(10, 0, 0, 2)).unwrap().port, 2);
        assert!(!table.contains(Ipv4Addr::new(10, 0, 0, 9)));
    }

    #[test]
    fn test_empty_table_rejected() {
        let err = BackendTable::new(Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::NoBackends));
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let err = BackendTable::new([entry(1), entry(1)]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateBackend(_)));
    }
}
