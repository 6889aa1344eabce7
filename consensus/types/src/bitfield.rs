//! A variable-length bitlist backed by a byte vector.
//!
//! The length is tracked separately from the storage so a bitlist sized to a
//! committee reports that committee's size even when no bits are set.

use crate::serde_hex;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bitlist {
    len: usize,
    bytes: Vec<u8>,
}

impl Bitlist {
    /// Create a bitlist of `len` bits, all unset.
    pub fn with_len(len: usize) -> Self {
        Self {
            len,
            bytes: vec![0; (len + 7) / 8],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read a bit. Out-of-range reads return `false`.
    pub fn get(&self, i: usize) -> bool {
        if i >= self.len {
            return false;
        }
        self.bytes[i / 8] & (1 << (i % 8)) != 0
    }

    /// Set a bit. Out-of-range writes are ignored.
    pub fn set(&mut self, i: usize, value: bool) {
        if i >= self.len {
            return;
        }
        if value {
            self.bytes[i / 8] |= 1 << (i % 8);
        } else {
            self.bytes[i / 8] &= !(1 << (i % 8));
        }
    }

    /// Number of set bits.
    pub fn num_set_bits(&self) -> u64 {
        self.bytes.iter().map(|byte| byte.count_ones() as u64).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|byte| *byte == 0)
    }

    /// Iterator over the indices of set bits.
    pub fn iter_set_bits(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |i| self.get(*i))
    }

    /// Set every bit that is set in `other`. Grows to `other`'s length if
    /// `other` is longer.
    pub fn union_assign(&mut self, other: &Bitlist) {
        if other.len > self.len {
            self.len = other.len;
            self.bytes.resize((other.len + 7) / 8, 0);
        }
        for (byte, other_byte) in self.bytes.iter_mut().zip(other.bytes.iter()) {
            *byte |= other_byte;
        }
    }

    /// Count the bits set in `self` but not in `seen`.
    pub fn new_bits(&self, seen: &Bitlist) -> u64 {
        let mut count = 0u64;
        for (i, byte) in self.bytes.iter().enumerate() {
            let seen_byte = seen.bytes.get(i).copied().unwrap_or(0);
            count += (byte & !seen_byte).count_ones() as u64;
        }
        count
    }
}

impl fmt::Debug for Bitlist {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Bitlist(len: {}, set: {})",
            self.len,
            self.num_set_bits()
        )
    }
}

// Wire form is the SSZ bitlist encoding: the data bits followed by a single
// delimiter bit marking the length, hex encoded.
impl Serialize for Bitlist {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut encoded = vec![0u8; self.len / 8 + 1];
        let copy_len = self.bytes.len().min(encoded.len());
        encoded[..copy_len]
            .iter_mut()
            .zip(self.bytes.iter())
            .for_each(|(out, byte)| *out = *byte);
        encoded[self.len / 8] |= 1 << (self.len % 8);
        serializer.serialize_str(&serde_hex::encode(&encoded))
    }
}

impl<'de> Deserialize<'de> for Bitlist {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        let encoded = serde_hex::decode(&string).map_err(D::Error::custom)?;
        let last = *encoded
            .last()
            .ok_or_else(|| D::Error::custom("empty bitlist payload"))?;
        if last == 0 {
            return Err(D::Error::custom("bitlist is missing its delimiter bit"));
        }
        let delimiter = 7 - last.leading_zeros() as usize;
        let len = (encoded.len() - 1) * 8 + delimiter;

        let mut bytes = encoded;
        // Clear the delimiter and drop any byte past the data.
        let last_index = bytes.len() - 1;
        bytes[last_index] &= !(1 << delimiter);
        bytes.truncate((len + 7) / 8);
        if len % 8 == 0 {
            // Delimiter occupied a byte of its own.
            bytes.resize((len + 7) / 8, 0);
        }
        Ok(Self { len, bytes })
    }
}
