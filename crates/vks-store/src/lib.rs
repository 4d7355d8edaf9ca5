//! vks-store: the shared store the remote-signer fleet reads keys from
//!
//! Records live one JSON document per key at
//! `{prefix}/validators/{public_key}.json`, so signers can pick up their
//! group with a plain prefix listing and writes for distinct keys never
//! contend.

pub mod health;
pub mod operator;
pub mod records;

pub use health::{check_health, is_healthy};
pub use operator::{build_operator, S3Credentials};
pub use records::OperatorStore;

use async_trait::async_trait;
use vks_core::{ValidatorKeyRecord, VksResult};

/// Outcome counts of an [`SyncStore::upsert`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Persistence for validator key records, keyed by public key.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// `true` if the store answered a trivial request.
    async fn connection_check(&self) -> bool;

    /// Number of records currently stored.
    async fn count(&self) -> VksResult<u64>;

    /// Every stored record, ordered by public key.
    async fn records(&self) -> VksResult<Vec<ValidatorKeyRecord>>;

    /// Insert-or-replace by public key. Re-writing an identical record is a
    /// no-op reported as `unchanged`.
    async fn upsert(&self, records: &[ValidatorKeyRecord]) -> VksResult<UpsertSummary>;
}
