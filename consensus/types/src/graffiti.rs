use crate::serde_hex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const GRAFFITI_BYTES_LEN: usize = 32;

/// The 32-byte graffiti field of a beacon block, UTF-8 padded with zeroes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Graffiti(#[serde(with = "serde_hex::fixed")] pub [u8; GRAFFITI_BYTES_LEN]);

impl FromStr for Graffiti {
    type Err = String;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let bytes = string.as_bytes();
        if bytes.len() > GRAFFITI_BYTES_LEN {
            return Err(format!(
                "graffiti exceeds {GRAFFITI_BYTES_LEN} bytes: {string}"
            ));
        }
        let mut fixed = [0; GRAFFITI_BYTES_LEN];
        fixed[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(fixed))
    }
}

impl fmt::Debug for Graffiti {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", serde_hex::encode(self.0))
    }
}
