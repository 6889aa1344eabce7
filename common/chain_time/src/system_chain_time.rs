use crate::ChainTime;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use types::Slot;

/// Determines the present slot from the system clock.
#[derive(Clone)]
pub struct SystemChainTime {
    genesis_duration: Duration,
    slot_duration: Duration,
    slots_per_epoch: u64,
}

impl ChainTime for SystemChainTime {
    fn new(genesis_duration: Duration, slot_duration: Duration, slots_per_epoch: u64) -> Self {
        assert!(
            slot_duration.as_millis() > 0,
            "SystemChainTime cannot have a < 1ms slot duration"
        );
        assert!(slots_per_epoch > 0, "slots_per_epoch must be non-zero");

        Self {
            genesis_duration,
            slot_duration,
            slots_per_epoch,
        }
    }

    fn now(&self) -> Option<Slot> {
        self.slot_of(self.now_duration()?)
    }

    fn now_duration(&self) -> Option<Duration> {
        SystemTime::now().duration_since(UNIX_EPOCH).ok()
    }

    fn slot_of(&self, instant: Duration) -> Option<Slot> {
        let since_genesis = instant.checked_sub(self.genesis_duration)?;
        Some(Slot::new(
            (since_genesis.as_millis() / self.slot_duration.as_millis()) as u64,
        ))
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn slots_per_epoch(&self) -> u64 {
        self.slots_per_epoch
    }

    fn genesis_duration(&self) -> Duration {
        self.genesis_duration
    }
}
