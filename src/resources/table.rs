//! Dense, ID-addressable resource array.
//!
//! Keeps values packed in a contiguous `Vec` whose layout mirrors a GPU
//! storage buffer, while staying addressable by stable [`ResourceId`].
//! Removal is swap-and-pop: the last element moves into the vacated slot and
//! the index maps are patched, so indices held by third parties stay valid
//! only if they react to the reported [`Removal`].

use rustc_hash::FxHashMap;

use crate::registry::ResourceId;

/// Outcome of a swap-and-pop removal.
#[derive(Debug)]
pub struct Removal<T> {
    /// The removed value.
    pub value: T,
    /// The dense index the value occupied.
    pub removed_index: u32,
    /// The former index of the element that was swapped into
    /// `removed_index`, or `None` when the removed element was last.
    pub transfer_index: Option<u32>,
}

/// Dense array of `T` with bidirectional ID/index maps.
pub struct ResourceTable<T> {
    values: Vec<T>,
    index_of: FxHashMap<ResourceId, u32>,
    id_at: FxHashMap<u32, ResourceId>,
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResourceTable<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            index_of: FxHashMap::default(),
            id_at: FxHashMap::default(),
        }
    }

    /// Appends `value` under `id` and returns its dense index.
    pub fn insert(&mut self, id: ResourceId, value: T) -> u32 {
        debug_assert!(!self.index_of.contains_key(&id));
        let index = self.values.len() as u32;
        self.values.push(value);
        self.index_of.insert(id, index);
        self.id_at.insert(index, id);
        index
    }

    /// Swap-and-pop removal by ID.
    pub fn remove(&mut self, id: ResourceId) -> Option<Removal<T>> {
        let removed_index = self.index_of.remove(&id)?;
        self.id_at.remove(&removed_index);

        let last_index = (self.values.len() - 1) as u32;
        let value = self.values.swap_remove(removed_index as usize);

        let transfer_index = if removed_index == last_index {
            None
        } else {
            // The former last element now lives at removed_index.
            let moved_id = self.id_at.remove(&last_index).unwrap();
            self.id_at.insert(removed_index, moved_id);
            self.index_of.insert(moved_id, removed_index);
            Some(last_index)
        };

        Some(Removal {
            value,
            removed_index,
            transfer_index,
        })
    }

    #[must_use]
    pub fn index_of(&self, id: ResourceId) -> Option<u32> {
        self.index_of.get(&id).copied()
    }

    #[must_use]
    pub fn id_at(&self, index: u32) -> Option<ResourceId> {
        self.id_at.get(&index).copied()
    }

    #[must_use]
    pub fn get(&self, id: ResourceId) -> Option<&T> {
        self.index_of
            .get(&id)
            .map(|&index| &self.values[index as usize])
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut T> {
        self.index_of
            .get(&id)
            .map(|&index| &mut self.values[index as usize])
    }

    #[must_use]
    pub fn get_by_index(&self, index: u32) -> Option<&T> {
        self.values.get(index as usize)
    }

    #[must_use]
    pub fn contains(&self, id: ResourceId) -> bool {
        self.index_of.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The dense slice, in GPU upload order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.values.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &T)> {
        self.values
            .iter()
            .enumerate()
            .map(|(index, value)| (self.id_at[&(index as u32)], value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{IdRegistry, ObjectType};

    fn ids(n: usize) -> Vec<ResourceId> {
        let registry = IdRegistry::new();
        (0..n)
            .map(|_| registry.generate(ObjectType::Material))
            .collect()
    }

    #[test]
    fn remove_last_reports_no_transfer() {
        let ids = ids(2);
        let mut table = ResourceTable::new();
        table.insert(ids[0], "a");
        table.insert(ids[1], "b");

        let removal = table.remove(ids[1]).unwrap();
        assert_eq!(removal.removed_index, 1);
        assert_eq!(removal.transfer_index, None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.index_of(ids[0]), Some(0));
    }

    #[test]
    fn remove_middle_swaps_last_into_hole() {
        let ids = ids(3);
        let mut table = ResourceTable::new();
        table.insert(ids[0], "a");
        table.insert(ids[1], "b");
        table.insert(ids[2], "c");

        let removal = table.remove(ids[0]).unwrap();
        assert_eq!(removal.removed_index, 0);
        assert_eq!(removal.transfer_index, Some(2));
        assert_eq!(removal.value, "a");

        // Last element moved into the hole; maps stay bidirectionally
        // consistent.
        assert_eq!(table.index_of(ids[2]), Some(0));
        assert_eq!(table.id_at(0), Some(ids[2]));
        assert_eq!(table.get(ids[2]), Some(&"c"));
        assert_eq!(table.index_of(ids[1]), Some(1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_unknown_id_is_none() {
        let ids = ids(2);
        let mut table: ResourceTable<&str> = ResourceTable::new();
        table.insert(ids[0], "a");
        assert!(table.remove(ids[1]).is_none());
    }
}
