//! Stable fixed-capacity group assignment
//!
//! A key at stable position `p` lives in group `p / capacity`. Positions
//! are handed out append-only, so growing the key set never moves a key
//! that is already placed.

use vks_core::{VksError, VksResult};
use vks_crypto::SigningKeyPair;

/// A key together with the signer group it belongs to.
#[derive(Debug, Clone)]
pub struct AssignedKey {
    pub key: SigningKeyPair,
    pub group_index: u64,
}

pub(crate) fn check_capacity(capacity: u64) -> VksResult<()> {
    if capacity == 0 {
        return Err(VksError::InvalidCapacity(capacity));
    }
    Ok(())
}

/// Place `new_keys` after the `existing_count` keys already committed.
pub fn assign(
    existing_count: u64,
    new_keys: Vec<SigningKeyPair>,
    capacity: u64,
) -> VksResult<Vec<AssignedKey>> {
    check_capacity(capacity)?;
    Ok(new_keys
        .into_iter()
        .zip(existing_count..)
        .map(|(key, position)| AssignedKey {
            key,
            group_index: position / capacity,
        })
        .collect())
}

/// Number of signer groups needed for `total_keys`: `ceil(total / capacity)`.
pub fn group_count(total_keys: u64, capacity: u64) -> VksResult<u64> {
    check_capacity(capacity)?;
    Ok(total_keys.div_ceil(capacity))
}
