//! EIP-2333 / EIP-2334 validator signing key derivation over BLS12-381

use blst::min_pk::SecretKey;
use zeroize::Zeroizing;

use crate::secret::MasterSecret;
use crate::{PUBLIC_KEY_SIZE, SCALAR_SIZE};
use vks_core::{DerivationIndex, DerivationScheme, VksError, VksResult};

/// EIP-2334 purpose and coin type: `m/12381/3600`
const PURPOSE: u32 = 12381;
const COIN_TYPE: u32 = 3600;

/// A validator signing keypair.
///
/// The public key is the key's external identity; the secret scalar is only
/// reachable through [`SigningKeyPair::secret_scalar`].
#[derive(Clone)]
pub struct SigningKeyPair {
    index: Option<DerivationIndex>,
    secret: SecretKey,
    public_key: String,
}

impl SigningKeyPair {
    fn new(index: Option<DerivationIndex>, secret: SecretKey) -> Self {
        let public_key = format_public_key(&secret.sk_to_pk().compress());
        Self {
            index,
            secret,
            public_key,
        }
    }

    /// Rebuild a keypair from a big-endian secret scalar, recomputing the
    /// public key. Used for keys recovered from a transfer bundle.
    pub fn from_scalar(scalar: &[u8], index: Option<DerivationIndex>) -> VksResult<Self> {
        if scalar.len() != SCALAR_SIZE {
            return Err(VksError::InvalidKey(format!(
                "secret scalar must be {SCALAR_SIZE} bytes, got {}",
                scalar.len()
            )));
        }
        let secret = SecretKey::from_bytes(scalar)
            .map_err(|e| VksError::InvalidKey(format!("secret scalar out of range: {e:?}")))?;
        Ok(Self::new(index, secret))
    }

    /// Derivation index, or `None` for transferred keys.
    pub fn index(&self) -> Option<DerivationIndex> {
        self.index
    }

    /// Canonical `0x`-prefixed hex of the 48-byte compressed public key.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Big-endian secret scalar. Zeroized when the returned value drops.
    pub fn secret_scalar(&self) -> Zeroizing<[u8; SCALAR_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("index", &self.index)
            .field("public_key", &self.public_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Derives signing keys for one (secret, scheme) pair.
///
/// Holds the `m/12381/3600` node so each index costs three child derivations
/// instead of five plus a master key generation.
pub struct KeyDeriver {
    coin_node: SecretKey,
}

impl KeyDeriver {
    pub fn new(secret: &MasterSecret, scheme: DerivationScheme) -> VksResult<Self> {
        let master = SecretKey::derive_master_eip2333(secret.ikm(scheme)).map_err(|e| {
            VksError::InvalidSecret(format!("EIP-2333 master key derivation failed: {e:?}"))
        })?;
        let coin_node = master
            .derive_child_eip2333(PURPOSE)
            .derive_child_eip2333(COIN_TYPE);
        Ok(Self { coin_node })
    }

    /// Signing key at `m/12381/3600/{index}/0/0`.
    pub fn derive(&self, index: DerivationIndex) -> SigningKeyPair {
        let signing = self
            .coin_node
            .derive_child_eip2333(index)
            .derive_child_eip2333(0)
            .derive_child_eip2333(0);
        SigningKeyPair::new(Some(index), signing)
    }

    /// The dense, ordered key sequence starting at index 0.
    pub fn sequence(&self) -> impl Iterator<Item = SigningKeyPair> + '_ {
        (0..=DerivationIndex::MAX).map(move |index| self.derive(index))
    }
}

/// Derive the signing keypair at `index`.
pub fn derive(
    secret: &MasterSecret,
    index: DerivationIndex,
    scheme: DerivationScheme,
) -> VksResult<SigningKeyPair> {
    Ok(KeyDeriver::new(secret, scheme)?.derive(index))
}

/// Canonical public key identifier: `0x` + lowercase hex.
pub fn format_public_key(compressed: &[u8; PUBLIC_KEY_SIZE]) -> String {
    format!("0x{}", hex::encode(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::collections::HashSet;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon \
                            abandon abandon abandon abandon abandon about";

    fn test_secret() -> MasterSecret {
        MasterSecret::from_mnemonic(&SecretString::from(MNEMONIC)).unwrap()
    }

    #[test]
    fn test_derive_deterministic() {
        let secret = test_secret();
        let a = derive(&secret, 3, DerivationScheme::Standard).unwrap();
        let b = derive(&secret, 3, DerivationScheme::Standard).unwrap();

        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(*a.secret_scalar(), *b.secret_scalar());
        assert_eq!(a.index(), Some(3));
    }

    #[test]
    fn test_deriver_matches_free_function() {
        let secret = test_secret();
        let deriver = KeyDeriver::new(&secret, DerivationScheme::Legacy).unwrap();
        for index in 0..3 {
            let direct = derive(&secret, index, DerivationScheme::Legacy).unwrap();
            assert_eq!(deriver.derive(index).public_key(), direct.public_key());
        }
    }

    #[test]
    fn test_distinct_indices_distinct_keys() {
        let secret = test_secret();
        let deriver = KeyDeriver::new(&secret, DerivationScheme::Standard).unwrap();
        let keys: HashSet<String> = deriver
            .sequence()
            .take(20)
            .map(|k| k.public_key().to_string())
            .collect();
        assert_eq!(keys.len(), 20);
    }

    #[test]
    fn test_schemes_produce_different_keys() {
        let secret = test_secret();
        let standard = derive(&secret, 0, DerivationScheme::Standard).unwrap();
        let legacy = derive(&secret, 0, DerivationScheme::Legacy).unwrap();
        assert_ne!(standard.public_key(), legacy.public_key());
    }

    #[test]
    fn test_public_key_format() {
        let key = derive(&test_secret(), 0, DerivationScheme::Standard).unwrap();
        assert!(key.public_key().starts_with("0x"));
        assert_eq!(key.public_key().len(), 2 + PUBLIC_KEY_SIZE * 2);
        assert_eq!(key.public_key(), key.public_key().to_lowercase());
    }

    #[test]
    fn test_from_scalar_recomputes_public_key() {
        let key = derive(&test_secret(), 7, DerivationScheme::Standard).unwrap();
        let rebuilt = SigningKeyPair::from_scalar(&key.secret_scalar()[..], None).unwrap();

        assert_eq!(rebuilt.public_key(), key.public_key());
        assert_eq!(rebuilt.index(), None);
    }

    #[test]
    fn test_from_scalar_rejects_bad_input() {
        assert!(SigningKeyPair::from_scalar(&[1u8; 31], None).is_err());
        assert!(SigningKeyPair::from_scalar(&[0u8; 32], None).is_err(), "zero scalar");
        assert!(SigningKeyPair::from_scalar(&[0xffu8; 32], None).is_err(), "scalar >= r");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = derive(&test_secret(), 0, DerivationScheme::Standard).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains(key.public_key()));
    }
}
