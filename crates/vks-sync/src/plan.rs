//! Sync orchestration: compute a [`SyncPlan`] without side effects, then
//! apply it to the store in one batch.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::groups::{assign, check_capacity};
use crate::scanner::scan;
use crate::transfer::{merge, TransferFailure, TransferFile};
use crate::ProgressFn;
use vks_core::{
    DerivationIndex, DerivationScheme, OperatorAddress, ValidatorKeyRecord, VksError, VksResult,
};
use vks_crypto::{open, seal, CipherKey, MasterSecret, RecipientSecretKey, SigningKeyPair};
use vks_registry::RegistrationOracle;
use vks_store::{SyncStore, UpsertSummary};

/// Encrypted key files handed over by another operator.
pub struct TransferBundle<'a> {
    pub files: Vec<TransferFile>,
    pub recipient: &'a RecipientSecretKey,
}

/// Inputs of one sync run.
pub struct SyncRequest<'a> {
    pub secret: &'a MasterSecret,
    pub scheme: DerivationScheme,
    pub operator: OperatorAddress,
    pub capacity: u64,
    /// At-rest key from a previous run. A fresh key is generated when
    /// absent, which re-encrypts every active record.
    pub cipher_key: Option<CipherKey>,
    pub transfer: Option<TransferBundle<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChange {
    /// Not in the store yet; takes the next stable position
    New,
    /// Already stored; keeps its group, payload sealed under this run's key
    Reencrypted,
}

#[derive(Debug, Clone)]
pub struct PlannedWrite {
    pub record: ValidatorKeyRecord,
    /// Derivation index, `None` for transferred keys
    pub index: Option<DerivationIndex>,
    pub change: RecordChange,
}

/// Everything a sync would write, computed before any store mutation.
#[derive(Debug)]
pub struct SyncPlan {
    pub writes: Vec<PlannedWrite>,
    /// Public keys already stored exactly as this run would write them
    pub unchanged: Vec<String>,
    /// Stored keys outside this run that do not open under its cipher key
    pub stale: Vec<String>,
    pub transfer_failures: Vec<TransferFailure>,
    pub active_keys: usize,
    pub transferred_keys: usize,
    /// Store record count when the plan was made
    pub existing_count: u64,
    pub capacity: u64,
    cipher_key: CipherKey,
    cipher_key_reused: bool,
}

/// Result of an applied sync, for the operator.
#[derive(Debug)]
pub struct SyncReport {
    pub active_keys: usize,
    pub transferred_keys: usize,
    /// Records in the store after the write
    pub total_keys: u64,
    /// Signer instances to provision
    pub group_count: u64,
    pub written: UpsertSummary,
    pub unchanged: usize,
    pub stale: Vec<String>,
    pub transfer_failures: Vec<TransferFailure>,
    /// Surfaced once so it can be set on every signer instance
    pub cipher_key: CipherKey,
}

impl SyncPlan {
    pub fn new_count(&self) -> usize {
        self.writes
            .iter()
            .filter(|w| w.change == RecordChange::New)
            .count()
    }

    pub fn reencrypted_count(&self) -> usize {
        self.writes.len() - self.new_count()
    }

    /// Store record count once the plan is applied.
    pub fn total_keys(&self) -> u64 {
        self.existing_count + self.new_count() as u64
    }

    pub fn group_count(&self) -> u64 {
        self.total_keys().div_ceil(self.capacity)
    }

    pub fn cipher_key(&self) -> &CipherKey {
        &self.cipher_key
    }

    pub fn cipher_key_reused(&self) -> bool {
        self.cipher_key_reused
    }

    pub fn is_noop(&self) -> bool {
        self.writes.is_empty()
    }

    /// Write the planned records in a single upsert.
    pub async fn apply<S>(self, store: &S) -> VksResult<SyncReport>
    where
        S: SyncStore + ?Sized,
    {
        let written = if self.writes.is_empty() {
            UpsertSummary::default()
        } else {
            let records: Vec<ValidatorKeyRecord> =
                self.writes.iter().map(|w| w.record.clone()).collect();
            store.upsert(&records).await?
        };

        let total_keys = store.count().await?;
        let group_count = total_keys.div_ceil(self.capacity);
        info!(
            inserted = written.inserted,
            updated = written.updated,
            total_keys,
            group_count,
            "sync applied"
        );

        Ok(SyncReport {
            active_keys: self.active_keys,
            transferred_keys: self.transferred_keys,
            total_keys,
            group_count,
            written,
            unchanged: self.unchanged.len(),
            stale: self.stale,
            transfer_failures: self.transfer_failures,
            cipher_key: self.cipher_key,
        })
    }
}

struct Planner<'a> {
    snapshot: &'a HashMap<String, ValidatorKeyRecord>,
    cipher_key: &'a CipherKey,
    operator: OperatorAddress,
    covered: HashSet<String>,
    writes: Vec<PlannedWrite>,
    unchanged: Vec<String>,
}

impl Planner<'_> {
    /// Settle a key that is already stored. Returns the key back if it is
    /// new to the store and still needs a position.
    fn reconcile(&mut self, key: SigningKeyPair) -> VksResult<Option<SigningKeyPair>> {
        self.covered.insert(key.public_key().to_string());

        let Some(stored) = self.snapshot.get(key.public_key()) else {
            return Ok(Some(key));
        };

        if stored.operator == self.operator && self.opens_to(stored, &key) {
            debug!(public_key = key.public_key(), "record unchanged");
            self.unchanged.push(key.public_key().to_string());
        } else {
            let group_index = stored.group_index;
            debug!(public_key = key.public_key(), group_index, "record re-encrypted");
            self.push_write(&key, group_index, RecordChange::Reencrypted)?;
        }
        Ok(None)
    }

    fn opens_to(&self, stored: &ValidatorKeyRecord, key: &SigningKeyPair) -> bool {
        match open(self.cipher_key, &stored.encrypted_private_key) {
            Ok(plaintext) => plaintext[..] == key.secret_scalar()[..],
            Err(_) => false,
        }
    }

    fn push_write(
        &mut self,
        key: &SigningKeyPair,
        group_index: u64,
        change: RecordChange,
    ) -> VksResult<()> {
        let envelope = seal(self.cipher_key, &key.secret_scalar()[..])?;
        self.writes.push(PlannedWrite {
            record: ValidatorKeyRecord {
                public_key: key.public_key().to_string(),
                encrypted_private_key: envelope,
                group_index,
                operator: self.operator,
            },
            index: key.index(),
            change,
        });
        Ok(())
    }
}

/// Scan, reconcile against the store and seal, without writing anything.
///
/// Capacity is validated and the store probed before the scan starts, so a
/// misconfigured run costs no registry queries.
pub async fn plan_sync<O, S>(
    request: SyncRequest<'_>,
    oracle: &O,
    store: &S,
    progress: Option<&ProgressFn>,
) -> VksResult<SyncPlan>
where
    O: RegistrationOracle + ?Sized,
    S: SyncStore + ?Sized,
{
    let SyncRequest {
        secret,
        scheme,
        operator,
        capacity,
        cipher_key,
        transfer,
    } = request;

    check_capacity(capacity)?;
    if !store.connection_check().await {
        return Err(VksError::StoreUnavailable(
            "connection check failed before sync".into(),
        ));
    }

    let active = scan(secret, scheme, oracle, progress).await?;
    let active_keys = active.len();

    let existing_count = store.count().await?;
    let snapshot: HashMap<String, ValidatorKeyRecord> = store
        .records()
        .await?
        .into_iter()
        .map(|r| (r.public_key.clone(), r))
        .collect();

    let cipher_key_reused = cipher_key.is_some();
    let cipher_key = cipher_key.unwrap_or_else(CipherKey::generate);

    let mut planner = Planner {
        snapshot: &snapshot,
        cipher_key: &cipher_key,
        operator,
        covered: HashSet::new(),
        writes: Vec::new(),
        unchanged: Vec::new(),
    };

    let mut new_local = Vec::new();
    for key in active {
        if let Some(key) = planner.reconcile(key)? {
            new_local.push(key);
        }
    }
    let next_position = existing_count + new_local.len() as u64;
    for placed in assign(existing_count, new_local, capacity)? {
        planner.push_write(&placed.key, placed.group_index, RecordChange::New)?;
    }

    let mut transferred_keys = 0;
    let mut transfer_failures = Vec::new();
    if let Some(bundle) = transfer {
        let outcome = merge(bundle.files, bundle.recipient);
        transfer_failures = outcome.failures;

        let mut new_transferred = Vec::new();
        for key in outcome.keys {
            if planner.covered.contains(key.public_key()) {
                debug!(public_key = key.public_key(), "transferred key already managed, dropped");
                continue;
            }
            transferred_keys += 1;
            if let Some(key) = planner.reconcile(key)? {
                new_transferred.push(key);
            }
        }
        for placed in assign(next_position, new_transferred, capacity)? {
            planner.push_write(&placed.key, placed.group_index, RecordChange::New)?;
        }
    }

    let Planner {
        covered,
        writes,
        unchanged,
        ..
    } = planner;

    let mut stale: Vec<String> = snapshot
        .values()
        .filter(|r| !covered.contains(&r.public_key))
        .filter(|r| open(&cipher_key, &r.encrypted_private_key).is_err())
        .map(|r| r.public_key.clone())
        .collect();
    stale.sort();
    for public_key in &stale {
        warn!(%public_key, "stored record does not open under this cipher key; left untouched");
    }

    let plan = SyncPlan {
        writes,
        unchanged,
        stale,
        transfer_failures,
        active_keys,
        transferred_keys,
        existing_count,
        capacity,
        cipher_key,
        cipher_key_reused,
    };
    info!(
        active = plan.active_keys,
        transferred = plan.transferred_keys,
        new = plan.new_count(),
        reencrypted = plan.reencrypted_count(),
        unchanged = plan.unchanged.len(),
        stale = plan.stale.len(),
        "sync planned"
    );
    Ok(plan)
}

/// Plan and apply in one step.
pub async fn sync<O, S>(
    request: SyncRequest<'_>,
    oracle: &O,
    store: &S,
    progress: Option<&ProgressFn>,
) -> VksResult<SyncReport>
where
    O: RegistrationOracle + ?Sized,
    S: SyncStore + ?Sized,
{
    plan_sync(request, oracle, store, progress)
        .await?
        .apply(store)
        .await
}
