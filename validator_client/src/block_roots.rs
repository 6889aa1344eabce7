//! Block-root to slot lookup table.
//!
//! Populated by the controller from head events and on-demand block-header
//! fetches; read by the proposal scorer when walking ancestor chains. Reads
//! take a short shared lock and never perform I/O.

use parking_lot::RwLock;
use std::collections::HashMap;
use types::{Hash256, Slot};

#[derive(Default)]
pub struct BlockRootCache {
    roots: RwLock<HashMap<Hash256, Slot>>,
}

impl BlockRootCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, root: &Hash256) -> Option<Slot> {
        self.roots.read().get(root).copied()
    }

    pub fn contains(&self, root: &Hash256) -> bool {
        self.roots.read().contains_key(root)
    }

    pub fn insert(&self, root: Hash256, slot: Slot) {
        self.roots.write().insert(root, slot);
    }

    /// Drop entries older than `slot`, typically the last finalized slot.
    pub fn prune_below(&self, slot: Slot) {
        self.roots.write().retain(|_, entry| *entry >= slot);
    }

    /// Drop entries strictly after `slot`. Used on re-org, where everything
    /// past the common ancestor may have been orphaned.
    pub fn remove_after(&self, slot: Slot) {
        self.roots.write().retain(|_, entry| *entry <= slot);
    }

    pub fn len(&self) -> usize {
        self.roots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.read().is_empty()
    }
}

impl crate::scorer::SlotLookup for BlockRootCache {
    fn slot_of_root(&self, root: &Hash256) -> Option<Slot> {
        self.get(root)
    }
}
