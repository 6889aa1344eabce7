//! Serde for `u64` fields carried as decimal strings on the wire.
//!
//! The consensus HTTP API quotes every integer; deserialization accepts both
//! quoted and bare numbers so internally produced JSON also parses.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    deserializer.deserialize_any(QuotedU64Visitor)
}

pub(crate) struct QuotedU64Visitor;

impl<'de> Visitor<'de> for QuotedU64Visitor {
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a u64, quoted or not")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
        u64::try_from(value).map_err(|_| E::custom("negative value for u64 field"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
        value
            .parse()
            .map_err(|e| E::custom(format!("invalid u64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        value: u64,
    }

    #[test]
    fn accepts_both_forms() {
        let quoted: Wrapper = serde_json::from_str(r#"{"value": "12345"}"#).unwrap();
        assert_eq!(quoted.value, 12345);
        let bare: Wrapper = serde_json::from_str(r#"{"value": 12345}"#).unwrap();
        assert_eq!(bare.value, 12345);
    }
}
