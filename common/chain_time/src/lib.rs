//! Chain-time: the mapping between wall-clock time and slots/epochs.
//!
//! A `ChainTime` implementation is not required to be monotonically
//! increasing and may go backwards if the system clock is adjusted.

mod manual_chain_time;
mod system_chain_time;
mod time_delay;

pub use crate::manual_chain_time::ManualChainTime;
pub use crate::system_chain_time::SystemChainTime;
pub use crate::time_delay::TimeDelay;

use std::time::Duration;
use types::{Epoch, Slot};

/// A clock that reports the current slot and epoch, and predicts slot
/// boundaries.
pub trait ChainTime: Send + Sync {
    /// Creates a chain time where genesis occurred `genesis_duration` after
    /// the UNIX epoch, each slot is `slot_duration` long and epochs contain
    /// `slots_per_epoch` slots.
    fn new(genesis_duration: Duration, slot_duration: Duration, slots_per_epoch: u64) -> Self
    where
        Self: Sized;

    /// The slot at the present time, or `None` before genesis.
    fn now(&self) -> Option<Slot>;

    /// The present time as a duration since the UNIX epoch.
    fn now_duration(&self) -> Option<Duration>;

    /// The slot containing the given instant, or `None` before genesis.
    fn slot_of(&self, instant: Duration) -> Option<Slot>;

    fn slot_duration(&self) -> Duration;

    fn slots_per_epoch(&self) -> u64;

    fn genesis_duration(&self) -> Duration;

    /// The epoch at the present time.
    fn current_epoch(&self) -> Option<Epoch> {
        Some(self.now()?.epoch(self.slots_per_epoch()))
    }

    /// Duration from the UNIX epoch to the start of `slot`.
    fn start_of_slot(&self, slot: Slot) -> Duration {
        self.genesis_duration() + self.slot_duration() * (slot.as_u64() as u32)
    }

    /// Duration from now until the start of `slot`; zero if it has passed.
    fn duration_to_slot(&self, slot: Slot) -> Option<Duration> {
        let now = self.now_duration()?;
        Some(self.start_of_slot(slot).saturating_sub(now))
    }

    /// Duration until the next slot boundary.
    fn duration_to_next_slot(&self) -> Option<Duration> {
        let now = self.now_duration()?;
        if now < self.genesis_duration() {
            return Some(self.genesis_duration() - now);
        }
        let next = self.slot_of(now)? + 1;
        Some(self.start_of_slot(next).saturating_sub(now))
    }

    /// Duration until the first slot of the next epoch.
    fn duration_to_next_epoch(&self) -> Option<Duration> {
        let now = self.now_duration()?;
        if now < self.genesis_duration() {
            return Some(self.genesis_duration() - now);
        }
        let next_epoch = self.slot_of(now)?.epoch(self.slots_per_epoch()) + 1;
        let start = next_epoch.start_slot(self.slots_per_epoch());
        Some(self.start_of_slot(start).saturating_sub(now))
    }
}
