//! The `Slot` and `Epoch` types are defined as newtypes over `u64` to enforce
//! type-safety between the two.
//!
//! All math operations on `Slot` and `Epoch` are saturating; they never wrap.
//! Conversion between the two always goes through an explicit
//! `slots_per_epoch` parameter, which is a chain parameter rather than a
//! compile-time constant.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Rem, Sub, SubAssign};

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u64);

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

macro_rules! impl_common {
    ($main:ident) => {
        impl $main {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            pub fn as_usize(&self) -> usize {
                self.0 as usize
            }

            pub const fn max_value() -> Self {
                Self(u64::MAX)
            }

            pub fn saturating_sub<T: Into<u64>>(&self, other: T) -> Self {
                Self(self.0.saturating_sub(other.into()))
            }

            pub fn saturating_add<T: Into<u64>>(&self, other: T) -> Self {
                Self(self.0.saturating_add(other.into()))
            }
        }

        impl From<u64> for $main {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$main> for u64 {
            fn from(value: $main) -> u64 {
                value.0
            }
        }

        impl Add<u64> for $main {
            type Output = Self;

            fn add(self, other: u64) -> Self {
                Self(self.0.saturating_add(other))
            }
        }

        impl Add<$main> for $main {
            type Output = Self;

            fn add(self, other: Self) -> Self {
                Self(self.0.saturating_add(other.0))
            }
        }

        impl AddAssign<u64> for $main {
            fn add_assign(&mut self, other: u64) {
                self.0 = self.0.saturating_add(other);
            }
        }

        impl Sub<u64> for $main {
            type Output = Self;

            fn sub(self, other: u64) -> Self {
                Self(self.0.saturating_sub(other))
            }
        }

        impl Sub<$main> for $main {
            type Output = Self;

            fn sub(self, other: Self) -> Self {
                Self(self.0.saturating_sub(other.0))
            }
        }

        impl SubAssign<u64> for $main {
            fn sub_assign(&mut self, other: u64) {
                self.0 = self.0.saturating_sub(other);
            }
        }

        impl Rem<u64> for $main {
            type Output = u64;

            fn rem(self, modulus: u64) -> u64 {
                self.0 % modulus
            }
        }

        impl PartialEq<u64> for $main {
            fn eq(&self, other: &u64) -> bool {
                self.0 == *other
            }
        }

        impl fmt::Display for $main {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $main {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({})", stringify!($main), self.0)
            }
        }

        // Quoted on the wire, like every consensus-API integer.
        impl Serialize for $main {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                crate::serde_quoted::serialize(&self.0, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $main {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                crate::serde_quoted::deserialize(deserializer).map(Self)
            }
        }
    };
}

impl_common!(Slot);
impl_common!(Epoch);

impl Slot {
    /// The epoch containing this slot.
    pub fn epoch(self, slots_per_epoch: u64) -> Epoch {
        Epoch::new(self.0 / slots_per_epoch)
    }

    /// Position of this slot within its epoch.
    pub fn position_in_epoch(self, slots_per_epoch: u64) -> u64 {
        self.0 % slots_per_epoch
    }

    /// True if this slot is the first of its epoch.
    pub fn is_epoch_start(self, slots_per_epoch: u64) -> bool {
        self.0 % slots_per_epoch == 0
    }
}

impl Epoch {
    /// The first slot in the epoch.
    pub fn start_slot(self, slots_per_epoch: u64) -> Slot {
        Slot::new(self.0.saturating_mul(slots_per_epoch))
    }

    /// The last slot in the epoch.
    pub fn end_slot(self, slots_per_epoch: u64) -> Slot {
        Slot::new(
            self.0
                .saturating_mul(slots_per_epoch)
                .saturating_add(slots_per_epoch.saturating_sub(1)),
        )
    }

    /// Iterate over every slot in the epoch.
    pub fn slot_iter(self, slots_per_epoch: u64) -> SlotIter {
        SlotIter {
            current: self.start_slot(slots_per_epoch),
            end: self.end_slot(slots_per_epoch),
            done: false,
        }
    }
}

pub struct SlotIter {
    current: Slot,
    end: Slot,
    done: bool,
}

impl Iterator for SlotIter {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if self.done || self.current > self.end {
            return None;
        }
        let slot = self.current;
        if slot == self.end {
            self.done = true;
        } else {
            self.current += 1;
        }
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_epoch_conversion() {
        assert_eq!(Slot::new(0).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(31).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(32).epoch(32), Epoch::new(1));
        assert_eq!(Slot::new(12345).epoch(32), Epoch::new(385));
        assert_eq!(Epoch::new(385).start_slot(32), Slot::new(12320));
        assert_eq!(Epoch::new(385).end_slot(32), Slot::new(12351));
    }

    #[test]
    fn saturating_math() {
        assert_eq!(Slot::new(1) - 2u64, Slot::new(0));
        assert_eq!(Slot::max_value() + 1u64, Slot::max_value());
        assert_eq!(Epoch::new(5) - Epoch::new(7), Epoch::new(0));
    }

    #[test]
    fn slot_iter_covers_epoch() {
        let slots: Vec<_> = Epoch::new(2).slot_iter(8).collect();
        assert_eq!(slots.len(), 8);
        assert_eq!(slots[0], Slot::new(16));
        assert_eq!(slots[7], Slot::new(23));
    }
}
