//! At-rest envelopes: XChaCha20-Poly1305 under the operator cipher key

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    Tag, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use vks_core::{Envelope, VksError, VksResult};

/// The symmetric key protecting records at rest. Zeroized on drop.
///
/// Generated per sync unless the operator supplies the previous one; never
/// derived from the master secret.
#[derive(Clone)]
pub struct CipherKey {
    bytes: [u8; KEY_SIZE],
}

impl CipherKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Parse the base64 form handed to signer instances.
    pub fn from_base64(encoded: &str) -> VksResult<Self> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VksError::InvalidKey(format!("cipher key is not base64: {e}")))?;
        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(VksError::InvalidKey(format!(
                "cipher key must be {KEY_SIZE} bytes, got {len}"
            )));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }

    /// Base64 form for out-of-band distribution to signer instances.
    pub fn expose_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

impl Drop for CipherKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Seal `plaintext` under the cipher key with a fresh random nonce.
pub fn seal(key: &CipherKey, plaintext: &[u8]) -> VksResult<Envelope> {
    let (nonce, auth_tag, ciphertext) = seal_detached(key.as_bytes(), plaintext, b"")?;
    Ok(Envelope {
        wrapped_session_key: None,
        nonce,
        auth_tag,
        ciphertext,
    })
}

/// Open an at-rest envelope. Envelopes carrying a wrapped session key are
/// transfer envelopes and are rejected here.
pub fn open(key: &CipherKey, envelope: &Envelope) -> VksResult<Zeroizing<Vec<u8>>> {
    if envelope.wrapped_session_key.is_some() {
        return Err(VksError::DecryptionFailed);
    }
    open_detached(
        key.as_bytes(),
        &envelope.nonce,
        &envelope.auth_tag,
        &envelope.ciphertext,
        b"",
    )
}

/// Encrypt with a freshly generated nonce.
///
/// Returns `(nonce, tag, ciphertext)`; the nonce is never caller-supplied.
pub(crate) fn seal_detached(
    key: &[u8; KEY_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> VksResult<([u8; NONCE_SIZE], [u8; TAG_SIZE], Vec<u8>)> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), aad, &mut buffer)
        .map_err(|e| anyhow::anyhow!("envelope encryption failed: {e}"))?;

    let mut auth_tag = [0u8; TAG_SIZE];
    auth_tag.copy_from_slice(&tag);
    Ok((nonce, auth_tag, buffer))
}

/// Authenticated decryption. Every failure is the opaque `DecryptionFailed`.
pub(crate) fn open_detached(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    auth_tag: &[u8; TAG_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> VksResult<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(nonce),
            aad,
            &mut buffer,
            Tag::from_slice(auth_tag),
        )
        .map_err(|_| VksError::DecryptionFailed)?;
    Ok(buffer)
}
