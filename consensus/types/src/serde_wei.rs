//! Serde for 256-bit wei amounts carried as decimal strings, as the builder
//! API encodes bid values.

use crate::Uint256;
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &Uint256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uint256, D::Error> {
    let string = String::deserialize(deserializer)?;
    Uint256::from_dec_str(&string).map_err(|e| D::Error::custom(format!("invalid wei value: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        value: Uint256,
    }

    #[test]
    fn decimal_round_trip() {
        let one_eth = Wrapper {
            value: Uint256::exp10(18),
        };
        let json = serde_json::to_string(&one_eth).unwrap();
        assert_eq!(json, r#"{"value":"1000000000000000000"}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, one_eth.value);
    }
}
