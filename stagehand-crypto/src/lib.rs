//! Envelope encryption for staged file transfer.
//!
//! Provides per-file encryption using:
//! - ChaCha20-Poly1305 for authenticated payload encryption
//! - ChaCha20-Poly1305 key wrapping under the query-scoped master key
//! - Secure key management with zeroization
//!
//! # Architecture
//!
//! The encryption uses a two-tier key system:
//!
//! 1. **Master Key**: issued per query by the command resolver and shared
//!    by every file in that query. It never touches the storage provider.
//!
//! 2. **Content Key**: a random key generated for each file. The content
//!    key is wrapped with the master key and stored as provider object
//!    metadata alongside the encrypted bytes.
//!
//! This architecture allows:
//! - Renewing staging credentials without re-encrypting payloads (only the
//!   wrap changes when the master key rotates)
//! - Decrypting any staged object given just the master key and the
//!   object's own metadata

mod envelope;
mod error;
mod key;

pub use envelope::{
    open_payload, seal_payload, unwrap_content_key, wrap_content_key, decode_nonce, encode_nonce,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{generate_content_key, generate_nonce, ContentKey, MasterKey, KEY_SIZE, NONCE_SIZE};
