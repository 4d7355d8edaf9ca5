//! Shared fixtures for the sync integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use opendal::Operator;
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use vks_core::{DerivationScheme, OperatorAddress, VksError, VksResult};
use vks_crypto::{KeyDeriver, MasterSecret};
use vks_registry::RegistrationOracle;
use vks_store::OperatorStore;

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon \
                            abandon abandon abandon abandon abandon about";
pub const OTHER_MNEMONIC: &str = "legal winner thank year wave sausage worth \
                                  useful legal winner thank yellow";
pub const OPERATOR: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

pub fn secret(phrase: &str) -> MasterSecret {
    MasterSecret::from_mnemonic(&SecretString::from(phrase)).expect("valid test mnemonic")
}

pub fn operator() -> OperatorAddress {
    OPERATOR.parse().unwrap()
}

/// Public keys at indices `0..n`.
pub fn public_keys(secret: &MasterSecret, scheme: DerivationScheme, n: u32) -> Vec<String> {
    let deriver = KeyDeriver::new(secret, scheme).unwrap();
    (0..n)
        .map(|i| deriver.derive(i).public_key().to_string())
        .collect()
}

pub fn memory_store() -> OperatorStore {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    OperatorStore::new(op, "vks")
}

/// Reports the given public keys as registered, everything else as not.
pub struct SetOracle {
    registered: HashSet<String>,
    queries: AtomicUsize,
}

impl SetOracle {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            registered: keys.into_iter().collect(),
            queries: AtomicUsize::new(0),
        }
    }

    /// Registers indices `0..k` of `secret` under `scheme`.
    pub fn first(secret: &MasterSecret, scheme: DerivationScheme, k: u32) -> Self {
        Self::new(public_keys(secret, scheme, k))
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrationOracle for SetOracle {
    async fn is_registered(&self, public_key: &str) -> VksResult<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.registered.contains(public_key))
    }
}

/// Answers `true` for the first `healthy` queries, then fails.
pub struct FlakyOracle {
    healthy: usize,
    queries: AtomicUsize,
}

impl FlakyOracle {
    pub fn new(healthy: usize) -> Self {
        Self {
            healthy,
            queries: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RegistrationOracle for FlakyOracle {
    async fn is_registered(&self, _public_key: &str) -> VksResult<bool> {
        let n = self.queries.fetch_add(1, Ordering::SeqCst);
        if n < self.healthy {
            Ok(true)
        } else {
            Err(VksError::RegistryUnavailable("connection refused".into()))
        }
    }
}
