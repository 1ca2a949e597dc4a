//! In-memory public key directory.
//!
//! The runtime resolves peer identifiers to public keys through the
//! [`KeyDirectory`] trait from the protocol crate. This module provides the
//! concurrent in-memory implementation used by the agent (and by tests):
//! keys are registered under the identifier derived from the key itself,
//! so a directory entry can never claim an identifier it does not own.

use dashmap::DashMap;

use protocol::{KeyDirectory, ProtocolError, PublicKey};

/// Thread-safe in-memory identifier-to-key directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    /// Registered keys, indexed by their derived identifier.
    keys: DashMap<String, PublicKey>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a public key and returns the identifier it was filed under.
    ///
    /// The identifier is always derived from the key material, never
    /// caller-supplied. Re-registering the same key is a no-op.
    pub fn register(&self, key: PublicKey) -> String {
        let identifier = key.identifier();
        self.keys.insert(identifier.clone(), key);
        identifier
    }

    /// Removes a key by identifier. Returns whether an entry was removed.
    pub fn remove(&self, identifier: &str) -> bool {
        self.keys.remove(identifier).is_some()
    }

    /// Whether the directory holds a key for `identifier`.
    pub fn contains(&self, identifier: &str) -> bool {
        self.keys.contains_key(identifier)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyDirectory for InMemoryDirectory {
    fn resolve(&self, identifier: &str) -> protocol::Result<PublicKey> {
        self.keys
            .get(identifier)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ProtocolError::UnknownIdentifier(identifier.to_string()))
    }
}
