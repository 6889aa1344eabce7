use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Forks known to this client, in activation order.
///
/// Fork-versioned API objects carry a version string; versions not listed here
/// are surfaced as unsupported rather than rejected, so that a candidate block
/// from a newer beacon node degrades to a zero score instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    Base,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
}

impl ForkName {
    pub fn list_all() -> Vec<ForkName> {
        vec![
            ForkName::Base,
            ForkName::Altair,
            ForkName::Bellatrix,
            ForkName::Capella,
            ForkName::Deneb,
        ]
    }

    /// True from Altair onwards, when sync aggregates exist.
    pub fn altair_enabled(self) -> bool {
        self >= ForkName::Altair
    }

    /// True from Bellatrix onwards, when execution payloads (and therefore
    /// blinded blocks and builder bids) exist.
    pub fn bellatrix_enabled(self) -> bool {
        self >= ForkName::Bellatrix
    }
}

impl fmt::Display for ForkName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ForkName::Base => write!(f, "phase0"),
            ForkName::Altair => write!(f, "altair"),
            ForkName::Bellatrix => write!(f, "bellatrix"),
            ForkName::Capella => write!(f, "capella"),
            ForkName::Deneb => write!(f, "deneb"),
        }
    }
}

impl FromStr for ForkName {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "phase0" | "base" => Ok(ForkName::Base),
            "altair" => Ok(ForkName::Altair),
            "bellatrix" | "merge" => Ok(ForkName::Bellatrix),
            "capella" => Ok(ForkName::Capella),
            "deneb" => Ok(ForkName::Deneb),
            other => Err(format!("unknown fork name: {other}")),
        }
    }
}
