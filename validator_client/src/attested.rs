//! The single-action interlock: at most one signed message per validator per
//! key (epoch for attestations and proposals, slot for sync messages).
//!
//! The claim is taken *before* signing; paths that abort without signing must
//! retract it so the validator can act later in the period.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use types::ValidatorIndex;

pub struct AttestedSet<K: Eq + Hash + Copy + Ord> {
    inner: Mutex<HashMap<K, HashSet<ValidatorIndex>>>,
}

impl<K: Eq + Hash + Copy + Ord> Default for AttestedSet<K> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Copy + Ord> AttestedSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the action for `validator_index` under `key`. Returns `true` if
    /// this is the first claim, `false` if the validator already acted.
    pub fn try_claim(&self, key: K, validator_index: ValidatorIndex) -> bool {
        self.inner
            .lock()
            .entry(key)
            .or_default()
            .insert(validator_index)
    }

    /// Release a claim taken by `try_claim`, after an abort without signing.
    pub fn retract(&self, key: K, validator_index: ValidatorIndex) {
        if let Some(set) = self.inner.lock().get_mut(&key) {
            set.remove(&validator_index);
        }
    }

    pub fn contains(&self, key: K, validator_index: ValidatorIndex) -> bool {
        self.inner
            .lock()
            .get(&key)
            .map_or(false, |set| set.contains(&validator_index))
    }

    /// Drop keys older than `horizon`.
    pub fn prune_below(&self, horizon: K) {
        self.inner.lock().retain(|key, _| *key >= horizon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use types::Epoch;

    #[test]
    fn first_claim_wins() {
        let set = AttestedSet::new();
        assert!(set.try_claim(Epoch::new(1), 42));
        assert!(!set.try_claim(Epoch::new(1), 42));
        assert!(set.try_claim(Epoch::new(2), 42));
        assert!(set.try_claim(Epoch::new(1), 43));
    }

    #[test]
    fn retract_releases() {
        let set = AttestedSet::new();
        assert!(set.try_claim(Epoch::new(1), 42));
        set.retract(Epoch::new(1), 42);
        assert!(set.try_claim(Epoch::new(1), 42));
    }

    #[test]
    fn prune_drops_old_epochs() {
        let set = AttestedSet::new();
        set.try_claim(Epoch::new(1), 1);
        set.try_claim(Epoch::new(2), 1);
        set.prune_below(Epoch::new(2));
        assert!(!set.contains(Epoch::new(1), 1));
        assert!(set.contains(Epoch::new(2), 1));
    }

    // Even under concurrent claims, exactly one caller wins per validator.
    #[test]
    fn concurrent_claims_are_exclusive() {
        let set = Arc::new(AttestedSet::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let set = set.clone();
            handles.push(std::thread::spawn(move || {
                let mut won = 0;
                for index in 0..100u64 {
                    if set.try_claim(Epoch::new(7), index) {
                        won += 1;
                    }
                }
                won
            }));
        }
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);
    }
}
