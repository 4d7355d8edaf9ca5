use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use crate::error::VksError;

/// Position of a key in the deterministic derivation sequence.
pub type DerivationIndex = u32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Seed-stretching function used to turn a mnemonic into key material.
///
/// Fixed for a whole invocation. Index semantics are identical under both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivationScheme {
    /// SHA-256 of the mnemonic entropy
    Legacy,
    /// BIP-39 seed (PBKDF2-HMAC-SHA512, empty passphrase)
    #[default]
    Standard,
}

impl fmt::Display for DerivationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationScheme::Legacy => f.write_str("legacy"),
            DerivationScheme::Standard => f.write_str("standard"),
        }
    }
}

impl FromStr for DerivationScheme {
    type Err = VksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(DerivationScheme::Legacy),
            "standard" => Ok(DerivationScheme::Standard),
            other => Err(VksError::Config(format!(
                "unknown derivation scheme '{other}' (expected 'legacy' or 'standard')"
            ))),
        }
    }
}

/// Authenticated ciphertext package.
///
/// `wrapped_session_key` is present only for envelopes sealed to an X25519
/// recipient; at-rest envelopes are sealed directly under a cipher key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub wrapped_session_key: Option<Vec<u8>>,
    #[serde(with = "b64_array")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "b64_array")]
    pub auth_tag: [u8; TAG_SIZE],
    #[serde(with = "b64_vec")]
    pub ciphertext: Vec<u8>,
}

/// A validator key as persisted for the remote-signer fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorKeyRecord {
    /// Canonical `0x`-prefixed hex public key
    pub public_key: String,
    /// Secret scalar sealed under the at-rest cipher key
    pub encrypted_private_key: Envelope,
    /// Signer instance hosting this key
    pub group_index: u64,
    pub operator: OperatorAddress,
}

/// A 20-byte Ethereum address, displayed in EIP-55 checksum form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperatorAddress([u8; 20]);

impl OperatorAddress {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case encoding.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for OperatorAddress {
    type Err = VksError;

    /// Accepts all-lowercase or all-uppercase hex unconditionally; mixed case
    /// must match the EIP-55 checksum.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| VksError::Config(format!("operator address must start with 0x: {s}")))?;
        if digits.len() != 40 {
            return Err(VksError::Config(format!(
                "operator address must be 20 bytes, got {} hex digits",
                digits.len()
            )));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| VksError::Config(format!("operator address is not hex: {e}")))?;
        let address = Self(bytes);

        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum() != s {
            return Err(VksError::Config(format!(
                "operator address fails EIP-55 checksum: {s}"
            )));
        }
        Ok(address)
    }
}

impl TryFrom<String> for OperatorAddress {
    type Error = VksError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OperatorAddress> for String {
    fn from(value: OperatorAddress) -> Self {
        value.to_checksum()
    }
}

impl fmt::Display for OperatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for OperatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperatorAddress({})", self.to_checksum())
    }
}

mod b64_vec {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

mod b64_array {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(d: D) -> Result<[u8; N], D::Error> {
        let encoded = String::deserialize(d)?;
        let decoded = STANDARD.decode(encoded).map_err(serde::de::Error::custom)?;
        decoded.try_into().map_err(|v: Vec<u8>| {
            serde::de::Error::custom(format!("expected {N} bytes, got {}", v.len()))
        })
    }
}
