use crate::{AttestationData, Bitlist, SignatureBytes};
use serde::{Deserialize, Serialize};

/// An aggregated vote from one committee.
///
/// `aggregation_bits` is sized to the committee for
/// `(data.slot, data.index)`; bit `i` is set iff committee member `i`
/// contributed to `signature`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attestation {
    pub aggregation_bits: Bitlist,
    pub data: AttestationData,
    pub signature: SignatureBytes,
}

impl Attestation {
    /// A single-validator attestation with only `committee_position` set.
    pub fn single(
        committee_size: usize,
        committee_position: usize,
        data: AttestationData,
        signature: SignatureBytes,
    ) -> Self {
        let mut aggregation_bits = Bitlist::with_len(committee_size);
        aggregation_bits.set(committee_position, true);
        Self {
            aggregation_bits,
            data,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sets_exactly_one_bit() {
        let att = Attestation::single(
            128,
            5,
            AttestationData::default(),
            SignatureBytes::empty(),
        );
        assert_eq!(att.aggregation_bits.len(), 128);
        assert_eq!(att.aggregation_bits.num_set_bits(), 1);
        assert!(att.aggregation_bits.get(5));
    }
}
