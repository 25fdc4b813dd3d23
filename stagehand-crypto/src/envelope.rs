//! Payload encryption and content-key wrapping.
//!
//! The payload is encrypted in one authenticated pass with the file's
//! content key; the content key is wrapped under the query master key with
//! its own fresh nonce. Wrapped key and payload nonce are base64-encoded so
//! they can travel as provider object metadata.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{ContentKey, MasterKey, KEY_SIZE, NONCE_SIZE};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

/// Encrypts a file payload with its content key.
///
/// The returned ciphertext (including the Poly1305 tag) is what gets
/// uploaded; for chunked files the caller splits it into parts.
pub fn seal_payload(
    key: &ContentKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("payload seal failed: {e}")))
}

/// Decrypts a downloaded payload with its content key.
pub fn open_payload(
    key: &ContentKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            CryptoError::Decryption("payload open failed (wrong key or tampered data)".to_string())
        })
}

/// Wraps a content key under the master key.
///
/// A fresh wrap nonce is generated per call, so re-wrapping after a
/// credential renewal produces a new blob even for an unchanged content
/// key. Layout: base64(wrap nonce || wrapped key bytes).
pub fn wrap_content_key(master: &MasterKey, key: &ContentKey) -> CryptoResult<String> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(master.as_bytes()));

    let mut wrap_nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut wrap_nonce);

    let wrapped = cipher
        .encrypt(Nonce::from_slice(&wrap_nonce), key.as_bytes().as_slice())
        .map_err(|e| CryptoError::Encryption(format!("key wrap failed: {e}")))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + wrapped.len());
    blob.extend_from_slice(&wrap_nonce);
    blob.extend_from_slice(&wrapped);
    Ok(BASE64.encode(blob))
}

/// Unwraps a content key previously wrapped with [`wrap_content_key`].
pub fn unwrap_content_key(master: &MasterKey, wrapped_b64: &str) -> CryptoResult<ContentKey> {
    let blob = BASE64
        .decode(wrapped_b64)
        .map_err(|e| CryptoError::KeyMaterial(format!("wrapped key is not base64: {e}")))?;

    if blob.len() <= NONCE_SIZE {
        return Err(CryptoError::KeyMaterial(format!(
            "wrapped key blob too short: {} bytes",
            blob.len()
        )));
    }

    let (wrap_nonce, wrapped) = blob.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(master.as_bytes()));

    let key_bytes = cipher
        .decrypt(Nonce::from_slice(wrap_nonce), wrapped)
        .map_err(|_| {
            CryptoError::Decryption("key unwrap failed (wrong master key or tampered data)".into())
        })?;

    if key_bytes.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key_bytes.len(),
        });
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&key_bytes);
    Ok(ContentKey::from_bytes(key))
}

/// Encodes a payload nonce for object metadata.
pub fn encode_nonce(nonce: &[u8; NONCE_SIZE]) -> String {
    BASE64.encode(nonce)
}

/// Decodes a payload nonce from object metadata.
pub fn decode_nonce(encoded: &str) -> CryptoResult<[u8; NONCE_SIZE]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CryptoError::KeyMaterial(format!("nonce is not base64: {e}")))?;

    if bytes.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: NONCE_SIZE,
            actual: bytes.len(),
        });
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&bytes);
    Ok(nonce)
}
