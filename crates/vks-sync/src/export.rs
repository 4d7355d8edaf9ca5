//! Export registered keys sealed to a recipient

use tracing::info;

use crate::scanner::scan;
use crate::ProgressFn;
use vks_core::{DerivationScheme, Envelope, VksError, VksResult};
use vks_crypto::{seal_for, MasterSecret, RecipientPublicKey};
use vks_registry::RegistrationOracle;

/// An active key sealed for transfer.
#[derive(Debug, Clone)]
pub struct ExportedKey {
    pub public_key: String,
    pub envelope: Envelope,
}

/// Scan for active keys and seal each secret scalar to `recipient`.
///
/// Fails with `NoRegisteredKeys` when the scan finds nothing, before anything
/// is sealed.
pub async fn export_registered<O>(
    secret: &MasterSecret,
    scheme: DerivationScheme,
    oracle: &O,
    recipient: &RecipientPublicKey,
    progress: Option<&ProgressFn>,
) -> VksResult<Vec<ExportedKey>>
where
    O: RegistrationOracle + ?Sized,
{
    let active = scan(secret, scheme, oracle, progress).await?;
    if active.is_empty() {
        return Err(VksError::NoRegisteredKeys);
    }

    let exported = active
        .iter()
        .map(|key| {
            Ok(ExportedKey {
                public_key: key.public_key().to_string(),
                envelope: seal_for(recipient, &key.secret_scalar()[..])?,
            })
        })
        .collect::<VksResult<Vec<_>>>()?;

    info!(count = exported.len(), "keys sealed for export");
    Ok(exported)
}
