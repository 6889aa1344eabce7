//! Opaque byte wrappers for BLS public keys, signatures and KZG commitments.
//!
//! The validator client never performs BLS arithmetic; keys and signatures are
//! carried as fixed-size byte strings with byte-wise equality, produced and
//! verified elsewhere (the signer and the beacon nodes respectively).

use crate::serde_hex;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! bytes_struct {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde(with = "serde_hex::fixed")] pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn empty() -> Self {
                Self([0; $len])
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_empty_sig(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn from_hex(string: &str) -> Result<Self, String> {
                let bytes = serde_hex::decode(string)?;
                let fixed: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| format!("expected {} bytes", $len))?;
                Ok(Self(fixed))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::empty()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", serde_hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                // Abbreviated form; full keys drown log lines.
                let hex = serde_hex::encode(self.0);
                write!(f, "{}({}..)", stringify!($name), &hex[..10])
            }
        }
    };
}

bytes_struct!(PublicKeyBytes, 48, "A BLS public key, as opaque bytes.");
bytes_struct!(SignatureBytes, 96, "A BLS signature, as opaque bytes.");
bytes_struct!(KzgCommitment, 48, "A KZG commitment to a blob, as opaque bytes.");
