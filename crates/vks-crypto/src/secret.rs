//! BIP-39 master secret
//!
//! The mnemonic is validated once and immediately reduced to the key material
//! both derivation schemes need. Nothing here is ever written to disk.

use bip39::Mnemonic;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use vks_core::{DerivationScheme, VksError, VksResult};

/// Validated mnemonic-derived seed material. Zeroized on drop.
pub struct MasterSecret {
    seed: Zeroizing<[u8; 64]>,
    legacy_ikm: Zeroizing<[u8; 32]>,
}

impl MasterSecret {
    /// Validate a BIP-39 English mnemonic (word list + checksum).
    pub fn from_mnemonic(phrase: &SecretString) -> VksResult<Self> {
        let normalized = Zeroizing::new(
            phrase
                .expose_secret()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        );

        let mnemonic: Mnemonic = normalized
            .parse()
            .map_err(|e| VksError::InvalidSecret(format!("invalid BIP-39 mnemonic: {e}")))?;

        let seed = Zeroizing::new(mnemonic.to_seed_normalized(""));

        let (entropy, len) = mnemonic.to_entropy_array();
        let entropy = Zeroizing::new(entropy);
        let mut legacy_ikm = Zeroizing::new([0u8; 32]);
        legacy_ikm.copy_from_slice(&Sha256::digest(&entropy[..len]));

        Ok(Self { seed, legacy_ikm })
    }

    /// Input keying material for EIP-2333 master key generation.
    pub(crate) fn ikm(&self, scheme: DerivationScheme) -> &[u8] {
        match scheme {
            DerivationScheme::Standard => &self.seed[..],
            DerivationScheme::Legacy => &self.legacy_ikm[..],
        }
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("seed", &"[REDACTED]")
            .finish()
    }
}
