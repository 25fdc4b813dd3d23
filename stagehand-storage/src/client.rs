//! The polymorphic storage client interface.

use async_trait::async_trait;
use bytes::Bytes;
use stagehand_types::{EncryptionHeader, FileMetadata, TransferOutcome};

/// Object-metadata key for the wrapped content key.
pub const META_WRAPPED_KEY: &str = "wrapped-key";
/// Object-metadata key for the payload nonce.
pub const META_NONCE: &str = "payload-nonce";
/// Object-metadata key for the hex SHA-256 of the plaintext.
pub const META_PLAIN_DIGEST: &str = "plain-digest";
/// Object-metadata key for the plaintext size in bytes.
pub const META_PLAIN_SIZE: &str = "plain-size";

/// Response from a single storage call.
///
/// Credential expiry is an expected, recoverable value — the provider
/// rejected the call because the staging credentials went stale, and the
/// agent will renew and re-invoke. Everything else that goes wrong is a
/// terminal `Failure` for the calling job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageResponse<T = ()> {
    Success(T),
    CredentialExpired,
    Failure(String),
}

impl<T> StorageResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, StorageResponse::Success(_))
    }

    pub fn is_credential_expired(&self) -> bool {
        matches!(self, StorageResponse::CredentialExpired)
    }

    /// Collapses the response into a per-job outcome, discarding any
    /// payload.
    pub fn outcome(&self) -> TransferOutcome {
        match self {
            StorageResponse::Success(_) => TransferOutcome::Success,
            StorageResponse::CredentialExpired => TransferOutcome::CredentialExpired,
            StorageResponse::Failure(reason) => TransferOutcome::Failure(reason.clone()),
        }
    }
}

/// Provider-stored object headers retrieved ahead of a download.
#[derive(Clone, Debug)]
pub struct RemoteFileHeader {
    pub encryption: EncryptionHeader,
    /// Size of the stored (encrypted) object.
    pub content_length: u64,
    pub plain_digest: Option<String>,
    pub plain_size: Option<u64>,
}

/// A finished chunk of a chunked upload, as acknowledged by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedChunk {
    pub part_number: i32,
    pub etag: String,
}

/// One storage provider bound to a stage snapshot.
///
/// All operations are safe to re-invoke after a credential renewal and
/// thread-safe across distinct metadata instances. Implementations never
/// retry internally; classification of the provider response is their whole
/// job.
#[async_trait]
pub trait StorageClient: Send + Sync + std::fmt::Debug {
    /// Streams already-encrypted bytes to the remote path derived from
    /// `meta`, attaching the encryption header as object metadata.
    async fn upload(&self, meta: &FileMetadata, body: Bytes) -> StorageResponse;

    /// Fetches the remote object body.
    async fn download(&self, meta: &FileMetadata) -> StorageResponse<Bytes>;

    /// Retrieves provider-stored object headers (wrapped key, nonce,
    /// sizes). Required before any decrypt.
    async fn fetch_remote_metadata(&self, remote_path: &str) -> StorageResponse<RemoteFileHeader>;

    /// Starts a chunked upload, returning the provider's upload id.
    async fn create_multipart_upload(&self, meta: &FileMetadata) -> StorageResponse<String>;

    /// Uploads one chunk of a chunked upload. Part numbers start at 1.
    async fn upload_part(
        &self,
        meta: &FileMetadata,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResponse<CompletedChunk>;

    /// Commits a chunked upload, merging all parts into the final object.
    async fn complete_multipart_upload(
        &self,
        meta: &FileMetadata,
        upload_id: &str,
        parts: Vec<CompletedChunk>,
    ) -> StorageResponse;
}

/// Builds the object-metadata map attached to uploads.
pub(crate) fn object_metadata(meta: &FileMetadata) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(4);
    if let Some(encryption) = &meta.encryption {
        pairs.push((META_WRAPPED_KEY.to_string(), encryption.wrapped_key.clone()));
        pairs.push((META_NONCE.to_string(), encryption.nonce.clone()));
    }
    pairs.push((META_PLAIN_DIGEST.to_string(), meta.plain_digest.clone()));
    pairs.push((META_PLAIN_SIZE.to_string(), meta.src_size.to_string()));
    pairs
}

/// Reassembles a [`RemoteFileHeader`] from a provider metadata map.
pub(crate) fn header_from_metadata(
    remote_path: &str,
    lookup: impl Fn(&str) -> Option<String>,
    content_length: u64,
) -> StorageResponse<RemoteFileHeader> {
    let (Some(wrapped_key), Some(nonce)) = (lookup(META_WRAPPED_KEY), lookup(META_NONCE)) else {
        return StorageResponse::Failure(format!(
            "remote object {remote_path} is missing its encryption header"
        ));
    };

    StorageResponse::Success(RemoteFileHeader {
        encryption: EncryptionHeader { wrapped_key, nonce },
        content_length,
        plain_digest: lookup(META_PLAIN_DIGEST),
        plain_size: lookup(META_PLAIN_SIZE).and_then(|s| s.parse().ok()),
    })
}
