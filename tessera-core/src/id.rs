//! Federated feature identifiers.
//!
//! A federated identifier packs the owning feature set id into the high 32
//! bits and the child store's local feature id into the low 32 bits. This
//! module is the only place where the two representations are translated.

use thiserror::Error;

/// Mask selecting the low 32 bits of an identifier.
pub const LOW_BITS_MASK: i64 = 0xFFFF_FFFF;

/// A 64-bit feature identifier that routes back to exactly one child store.
///
/// # Examples
///
/// ```
/// use tessera_core::FederatedId;
///
/// # fn main() -> Result<(), tessera_core::FederatedIdError> {
/// let id = FederatedId::encode(7, 42)?;
/// assert_eq!(id.decode(), (7, 42));
/// assert_eq!(id.raw(), (7_i64 << 32) | 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct FederatedId(i64);

/// Errors returned by [`FederatedId::encode`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FederatedIdError {
    /// The feature set id cannot be represented in 32 bits.
    #[error("feature set id {fsid} does not fit in 32 bits")]
    FeatureSetOutOfRange {
        /// Rejected feature set id.
        fsid: i64,
    },
    /// The local feature id cannot be represented in 32 bits.
    #[error("local feature id {local_id} does not fit in 32 bits")]
    LocalIdOutOfRange {
        /// Rejected child store feature id.
        local_id: i64,
    },
}

impl FederatedId {
    /// Pack `fsid` and a child store `local_id` into one identifier.
    ///
    /// Both halves must lie in `0..=u32::MAX`; values outside that range are
    /// rejected rather than truncated.
    pub const fn encode(fsid: i64, local_id: i64) -> Result<Self, FederatedIdError> {
        if !fits_low_bits(fsid) {
            return Err(FederatedIdError::FeatureSetOutOfRange { fsid });
        }
        if !fits_low_bits(local_id) {
            return Err(FederatedIdError::LocalIdOutOfRange { local_id });
        }
        Ok(Self((fsid << 32) | local_id))
    }

    /// Wrap an identifier previously produced by [`FederatedId::raw`].
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw 64-bit representation handed to callers.
    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Feature set id stored in the high 32 bits.
    #[must_use]
    pub const fn feature_set_id(self) -> i64 {
        (self.0 >> 32) & LOW_BITS_MASK
    }

    /// Child store feature id stored in the low 32 bits.
    #[must_use]
    pub const fn local_id(self) -> i64 {
        self.0 & LOW_BITS_MASK
    }

    /// Split the identifier into `(fsid, local_id)`.
    #[must_use]
    pub const fn decode(self) -> (i64, i64) {
        (self.feature_set_id(), self.local_id())
    }
}

impl From<FederatedId> for i64 {
    fn from(value: FederatedId) -> Self {
        value.raw()
    }
}

const fn fits_low_bits(value: i64) -> bool {
    value >= 0 && value <= LOW_BITS_MASK
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(LOW_BITS_MASK, LOW_BITS_MASK)]
    #[case(0x8000_0000, 5)]
    fn boundary_values_decode_symmetrically(#[case] fsid: i64, #[case] local_id: i64) {
        let id = FederatedId::encode(fsid, local_id).expect("in range");
        assert_eq!(id.decode(), (fsid, local_id));
    }

    #[rstest]
    #[case(-1)]
    #[case(LOW_BITS_MASK + 1)]
    fn out_of_range_feature_sets_are_rejected(#[case] fsid: i64) {
        assert_eq!(
            FederatedId::encode(fsid, 1),
            Err(FederatedIdError::FeatureSetOutOfRange { fsid })
        );
    }

    #[rstest]
    fn out_of_range_local_ids_are_rejected() {
        let local_id = LOW_BITS_MASK + 1;
        assert_eq!(
            FederatedId::encode(3, local_id),
            Err(FederatedIdError::LocalIdOutOfRange { local_id })
        );
    }

    proptest! {
        #[test]
        fn encode_then_decode_round_trips(fsid in 0..=LOW_BITS_MASK, local_id in 0..=LOW_BITS_MASK) {
            let id = FederatedId::encode(fsid, local_id).expect("in range");
            prop_assert_eq!(FederatedId::from_raw(id.raw()).decode(), (fsid, local_id));
        }
    }
}
