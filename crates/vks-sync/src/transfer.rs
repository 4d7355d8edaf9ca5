//! Merge keys handed over as encrypted envelope files

use tracing::{debug, info, warn};

use vks_core::{VksError, VksResult};
use vks_crypto::{decode_file, open_with, RecipientSecretKey, SigningKeyPair};

/// One encrypted key file from a transfer bundle.
#[derive(Debug, Clone)]
pub struct TransferFile {
    /// File name, for failure reports
    pub name: String,
    /// Public key the file claims to hold (the file stem)
    pub hint: String,
    /// Raw envelope file contents
    pub data: Vec<u8>,
}

/// A transfer file that could not be merged.
#[derive(Debug)]
pub struct TransferFailure {
    pub file: String,
    pub error: VksError,
}

#[derive(Debug, Default)]
pub struct TransferOutcome {
    /// Recovered keys, in bundle order
    pub keys: Vec<SigningKeyPair>,
    pub failures: Vec<TransferFailure>,
}

/// Open every file with the recipient key and rebuild its keypair.
///
/// Failures are isolated per file: a file that does not decrypt, or whose
/// recovered key does not match its hint, is reported and skipped.
pub fn merge(files: Vec<TransferFile>, recipient: &RecipientSecretKey) -> TransferOutcome {
    let mut outcome = TransferOutcome::default();

    for file in files {
        match recover(&file, recipient) {
            Ok(key) => {
                debug!(file = %file.name, public_key = key.public_key(), "transfer key recovered");
                outcome.keys.push(key);
            }
            Err(error) => {
                warn!(file = %file.name, "skipping transfer file: {error}");
                outcome.failures.push(TransferFailure {
                    file: file.name,
                    error,
                });
            }
        }
    }

    info!(
        recovered = outcome.keys.len(),
        failed = outcome.failures.len(),
        "transfer merge complete"
    );
    outcome
}

fn recover(file: &TransferFile, recipient: &RecipientSecretKey) -> VksResult<SigningKeyPair> {
    let envelope = decode_file(&file.data)?;
    let scalar = open_with(recipient, &envelope)?;
    // Authenticated but not a usable scalar
    let key = SigningKeyPair::from_scalar(&scalar, None).map_err(|error| {
        debug!(file = %file.name, "recovered scalar rejected: {error}");
        VksError::CorruptedTransfer {
            file: file.name.clone(),
            expected: file.hint.clone(),
            actual: "<invalid scalar>".to_string(),
        }
    })?;

    if normalize(&file.hint) != normalize(key.public_key()) {
        return Err(VksError::CorruptedTransfer {
            file: file.name.clone(),
            expected: file.hint.clone(),
            actual: key.public_key().to_string(),
        });
    }
    Ok(key)
}

/// Hints may come with or without `0x` and in either case.
fn normalize(public_key: &str) -> String {
    public_key
        .strip_prefix("0x")
        .unwrap_or(public_key)
        .to_ascii_lowercase()
}
