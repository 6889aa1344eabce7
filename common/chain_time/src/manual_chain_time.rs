use crate::ChainTime;
use parking_lot::RwLock;
use std::time::Duration;
use types::Slot;

/// Determines the present slot from a manually-advanced timestamp. Test use
/// only.
pub struct ManualChainTime {
    genesis_duration: Duration,
    current_time: RwLock<Duration>,
    slot_duration: Duration,
    slots_per_epoch: u64,
}

impl Clone for ManualChainTime {
    fn clone(&self) -> Self {
        Self {
            genesis_duration: self.genesis_duration,
            current_time: RwLock::new(*self.current_time.read()),
            slot_duration: self.slot_duration,
            slots_per_epoch: self.slots_per_epoch,
        }
    }
}

impl ManualChainTime {
    pub fn set_slot(&self, slot: u64) {
        *self.current_time.write() =
            self.genesis_duration + self.slot_duration * (slot as u32);
    }

    pub fn advance_slot(&self) {
        self.set_slot(self.now().expect("clock is post-genesis").as_u64() + 1)
    }

    pub fn set_current_time(&self, time: Duration) {
        *self.current_time.write() = time;
    }
}

impl ChainTime for ManualChainTime {
    fn new(genesis_duration: Duration, slot_duration: Duration, slots_per_epoch: u64) -> Self {
        assert!(
            slot_duration.as_millis() > 0,
            "ManualChainTime cannot have a < 1ms slot duration"
        );

        Self {
            genesis_duration,
            current_time: RwLock::new(genesis_duration),
            slot_duration,
            slots_per_epoch,
        }
    }

    fn now(&self) -> Option<Slot> {
        self.slot_of(*self.current_time.read())
    }

    fn now_duration(&self) -> Option<Duration> {
        Some(*self.current_time.read())
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

#[cfg(test)]
mod tests {
    use super::*;
    use types::Epoch;

    #[test]
    fn advances() {
        let clock = ManualChainTime::new(Duration::from_secs(0), Duration::from_secs(12), 32);
        assert_eq!(clock.now(), Some(Slot::new(0)));
        clock.advance_slot();
        assert_eq!(clock.now(), Some(Slot::new(1)));
        clock.set_slot(64);
        assert_eq!(clock.now(), Some(Slot::new(64)));
        assert_eq!(clock.current_epoch(), Some(Epoch::new(2)));
    }

    #[test]
    fn predicts_boundaries() {
        let clock = ManualChainTime::new(Duration::from_secs(100), Duration::from_secs(12), 32);
        clock.set_slot(5);
        assert_eq!(clock.start_of_slot(Slot::new(6)), Duration::from_secs(172));
        assert_eq!(
            clock.duration_to_next_slot(),
            Some(Duration::from_secs(12))
        );
        assert_eq!(
            clock.duration_to_slot(Slot::new(4)),
            Some(Duration::from_secs(0))
        );
    }
}
