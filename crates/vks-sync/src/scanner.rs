//! Registration-bounded derivation scan

use tracing::{debug, info};

use crate::ProgressFn;
use vks_core::{DerivationScheme, VksError, VksResult};
use vks_crypto::{KeyDeriver, MasterSecret, SigningKeyPair};
use vks_registry::RegistrationOracle;

/// Derive keys from index 0 upward, keeping each one the oracle reports as
/// registered, and stop at the first that is not.
///
/// Registration is assumed to be contiguous in derivation order: a gap ends
/// the active set. Oracle queries are issued one at a time. Any oracle
/// failure aborts the scan with `RegistryUnavailable`.
pub async fn scan<O>(
    secret: &MasterSecret,
    scheme: DerivationScheme,
    oracle: &O,
    progress: Option<&ProgressFn>,
) -> VksResult<Vec<SigningKeyPair>>
where
    O: RegistrationOracle + ?Sized,
{
    let deriver = KeyDeriver::new(secret, scheme)?;
    let mut active = Vec::new();

    for key in deriver.sequence() {
        let index = key.index().unwrap_or_default();
        let registered = oracle
            .is_registered(key.public_key())
            .await
            .map_err(|e| match e {
                VksError::RegistryUnavailable(msg) => VksError::RegistryUnavailable(format!(
                    "index {index} ({}): {msg}",
                    key.public_key()
                )),
                other => other,
            })?;

        if !registered {
            debug!(index, public_key = key.public_key(), "first unregistered key, scan ends");
            break;
        }

        debug!(index, public_key = key.public_key(), "registered");
        if let Some(cb) = progress {
            cb(active.len() as u64 + 1, 0, key.public_key());
        }
        active.push(key);
    }

    info!(active = active.len(), %scheme, "derivation scan complete");
    Ok(active)
}
