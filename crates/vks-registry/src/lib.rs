//! vks-registry: answers "is this validator public key already registered?"
//!
//! The scanner queries one key at a time, in derivation order, and stops at
//! the first unregistered key, so implementations must not assume batching.

pub mod beacon;

pub use beacon::BeaconOracle;

use async_trait::async_trait;
use vks_core::VksResult;

/// External source of truth for validator registration.
#[async_trait]
pub trait RegistrationOracle: Send + Sync {
    /// `Ok(false)` means "definitely not registered"; any failure to get an
    /// answer must be `Err(VksError::RegistryUnavailable)`.
    async fn is_registered(&self, public_key: &str) -> VksResult<bool>;
}

