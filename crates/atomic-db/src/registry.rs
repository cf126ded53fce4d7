//! Registry of the stores enrolled in scoped transactions.
//!
//! Only stores whose alias is in the explicitly allowed set take part in
//! scopes. Everything else that is configured is ignored by the harness,
//! so it never holds a transaction open on a database it was not told to
//! isolate.
//!
//! The registry order is the configuration order. Scopes are opened in
//! that order and rolled back in its reverse.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::Store;

/// Alias the harness enrols when nothing else is configured.
pub const DEFAULT_ALIAS: &str = "default";

/// Opaque name of one configured store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreId(String);

impl StoreId {
    /// Create an identifier from an alias.
    pub fn new(alias: &str) -> Self {
        Self(alias.to_owned())
    }

    /// The alias as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of connected stores plus the aliases enrolled in scopes.
#[derive(Debug)]
pub struct StoreRegistry {
    stores: Vec<Arc<Store>>,
    enrolled: BTreeSet<StoreId>,
}

impl StoreRegistry {
    /// Build a registry from connected stores in configuration order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateAlias`] if two stores share an alias,
    /// or [`StoreError::UnknownStore`] if an enrolled alias has no store.
    pub fn new(stores: Vec<Arc<Store>>, enrolled: &[String]) -> Result<Self, StoreError> {
        let mut seen = BTreeSet::new();
        for store in &stores {
            if !seen.insert(store.id().clone()) {
                return Err(StoreError::DuplicateAlias(store.id().to_string()));
            }
        }

        let enrolled: BTreeSet<StoreId> = enrolled.iter().map(|a| StoreId::new(a)).collect();
        if let Some(missing) = enrolled.iter().find(|id| !seen.contains(*id)) {
            return Err(StoreError::UnknownStore(missing.to_string()));
        }

        Ok(Self { stores, enrolled })
    }

    /// Enrolled store identifiers in registry order.
    ///
    /// Read mirrors are dropped unless `include_mirrors` is set. Callers
    /// tearing stores down walk this sequence in reverse.
    pub fn list_stores(&self, include_mirrors: bool) -> Vec<StoreId> {
        self.stores
            .iter()
            .filter(|s| self.enrolled.contains(s.id()))
            .filter(|s| include_mirrors || !s.is_mirror())
            .map(|s| s.id().clone())
            .collect()
    }

    /// Look up a store by identifier, enrolled or not.
    pub fn get(&self, id: &StoreId) -> Option<&Arc<Store>> {
        self.stores.iter().find(|s| s.id() == id)
    }

    /// Look up a store by identifier, failing if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownStore`] if no store has that alias.
    pub fn require(&self, id: &StoreId) -> Result<&Arc<Store>, StoreError> {
        self.get(id)
            .ok_or_else(|| StoreError::UnknownStore(id.to_string()))
    }

    /// Every configured store in registry order.
    pub fn all(&self) -> &[Arc<Store>] {
        &self.stores
    }

    /// Close every configured store's connections. Idempotent.
    pub async fn close_all(&self) {
        for store in self.stores.iter().rev() {
            store.close().await;
        }
    }
}
