//! Identity Registry
//!
//! Issues process-unique, monotonically increasing identifiers for every
//! object kind the editor tracks, and remembers each ID's kind so later
//! consumers can dispatch on it. IDs are never reused; the type map is
//! append-only for the process lifetime.
//!
//! The registry is an explicitly constructed instance shared via `Arc`, not
//! global state, so isolated subsystems can be unit tested without
//! process-wide side effects.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::errors::{AtelierError, Result};

/// The kind of object an ID was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Model,
    Mesh,
    Texture,
    Material,
    SceneNode,
}

/// A 64-bit opaque handle, unique for the process lifetime.
///
/// Only [`IdRegistry::generate`] creates these; everything else treats them
/// as opaque keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Raw value, for GPU-side object-ID records and logging.
    #[inline]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues IDs and records their [`ObjectType`].
pub struct IdRegistry {
    next: AtomicU64,
    types: RwLock<FxHashMap<ResourceId, ObjectType>>,
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            types: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns a fresh, strictly increasing ID and records its type.
    pub fn generate(&self, object_type: ObjectType) -> ResourceId {
        let id = ResourceId(self.next.fetch_add(1, Ordering::Relaxed));
        self.types.write().insert(id, object_type);
        id
    }

    /// Looks up the type an ID was issued with.
    pub fn type_of(&self, id: ResourceId) -> Result<ObjectType> {
        self.types
            .read()
            .get(&id)
            .copied()
            .ok_or(AtelierError::UnknownId(id))
    }

    /// Number of IDs issued so far.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.types.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_typed() {
        let registry = IdRegistry::new();
        let a = registry.generate(ObjectType::Mesh);
        let b = registry.generate(ObjectType::Texture);
        assert_ne!(a, b);
        assert_eq!(registry.type_of(a).unwrap(), ObjectType::Mesh);
        assert_eq!(registry.type_of(b).unwrap(), ObjectType::Texture);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let registry = IdRegistry::new();
        let issued = registry.generate(ObjectType::Model);
        assert!(registry.type_of(issued).is_ok());

        let never_issued = ResourceId(u64::MAX);
        assert!(matches!(
            registry.type_of(never_issued),
            Err(AtelierError::UnknownId(_))
        ));
    }
}
