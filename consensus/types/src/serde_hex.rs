//! Serde helpers for 0x-prefixed hex encoding of fixed and variable length
//! byte strings.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn encode<T: AsRef<[u8]>>(data: T) -> String {
    format!("0x{}", hex::encode(data.as_ref()))
}

pub fn decode(string: &str) -> Result<Vec<u8>, String> {
    let stripped = string
        .strip_prefix("0x")
        .ok_or_else(|| "hex string is missing 0x prefix".to_string())?;
    hex::decode(stripped).map_err(|e| format!("invalid hex: {e:?}"))
}

pub fn serialize<S, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&encode(data))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(deserializer)?;
    decode(&string).map_err(D::Error::custom)
}

/// Serde helpers for `[u8; N]` fields.
pub mod fixed {
    use super::*;

    pub fn serialize<S, const N: usize>(data: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode(data))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = super::deserialize(deserializer)?;
        let mut fixed = [0u8; N];
        if bytes.len() != N {
            return Err(D::Error::custom(format!(
                "expected {} bytes, got {}",
                N,
                bytes.len()
            )));
        }
        fixed.copy_from_slice(&bytes);
        Ok(fixed)
    }
}
