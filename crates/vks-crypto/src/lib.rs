//! vks-crypto: validator key material and the envelopes that carry it
//!
//! Derivation:
//! ```text
//! mnemonic ──(scheme)──► IKM ──EIP-2333──► m/12381/3600 ──► m/12381/3600/{i}/0/0
//!   STANDARD: BIP-39 seed (64 bytes)                         BLS12-381 signing key
//!   LEGACY:   SHA-256(mnemonic entropy)
//! ```
//!
//! Envelopes (XChaCha20-Poly1305, detached tag, random 192-bit nonce per seal):
//! ```text
//! at rest:   nonce(24) | tag(16) | ciphertext            key = operator cipher key
//! transfer:  wrapped(104) | nonce(24) | tag(16) | ciphertext
//!            wrapped = eph_pub(32) | wrap_nonce(24) | session_key(32) | wrap_tag(16)
//!            wrap_key = HKDF-SHA256(X25519(eph, recipient))
//! ```

pub mod derive;
pub mod envelope;
pub mod hybrid;
pub mod secret;

pub use derive::{derive, format_public_key, KeyDeriver, SigningKeyPair};
pub use envelope::{open, seal, CipherKey};
pub use hybrid::{decode_file, encode_file, open_with, seal_for, RecipientPublicKey, RecipientSecretKey};
pub use secret::MasterSecret;

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a BLS12-381 secret scalar
pub const SCALAR_SIZE: usize = 32;

/// Size of a compressed BLS12-381 G1 public key
pub const PUBLIC_KEY_SIZE: usize = 48;

pub use vks_core::types::{NONCE_SIZE, TAG_SIZE};
