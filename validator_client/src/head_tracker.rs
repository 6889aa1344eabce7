//! The latest chain head observed over the event streams.
//!
//! The proposer safety checks compare against this; the selector uses the
//! head's execution block hash when querying relays for bids.

use parking_lot::RwLock;
use types::{Hash256, Slot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadInfo {
    pub slot: Slot,
    pub root: Hash256,
    /// The head block's execution payload hash, filled in once the block body
    /// has been fetched.
    pub execution_hash: Option<Hash256>,
}

#[derive(Default)]
pub struct HeadTracker {
    inner: RwLock<Option<HeadInfo>>,
}

impl HeadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, slot: Slot, root: Hash256) {
        let mut inner = self.inner.write();
        match *inner {
            // Stale events out of order; keep the newer head.
            Some(current) if current.slot > slot => {}
            _ => {
                *inner = Some(HeadInfo {
                    slot,
                    root,
                    execution_hash: None,
                })
            }
        }
    }

    /// Attach the execution hash to the head, if `root` is still the head.
    pub fn set_execution_hash(&self, root: Hash256, execution_hash: Hash256) {
        let mut inner = self.inner.write();
        if let Some(head) = inner.as_mut() {
            if head.root == root {
                head.execution_hash = Some(execution_hash);
            }
        }
    }

    pub fn current(&self) -> Option<HeadInfo> {
        *self.inner.read()
    }
}
