//! In-memory storage client double.
//!
//! Backs the `Mock` stage type through factory injection. Supports
//! programmable credential expiry (the next N calls are rejected as
//! stale), per-operation call counters, and an in-flight high-water mark
//! for verifying the worker-pool concurrency bound.

use crate::client::{
    CompletedChunk, RemoteFileHeader, StorageClient, StorageResponse,
};
use async_trait::async_trait;
use bytes::Bytes;
use stagehand_types::FileMetadata;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One object held by the double, body plus provider metadata.
#[derive(Clone, Debug, Default)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub encryption: Option<stagehand_types::EncryptionHeader>,
    pub plain_digest: Option<String>,
    pub plain_size: Option<u64>,
}

#[derive(Debug, Default)]
struct PendingUpload {
    parts: BTreeMap<i32, Vec<u8>>,
}

/// In-memory storage client with programmable failure behavior.
#[derive(Debug, Default)]
pub struct InMemoryStorageClient {
    objects: Mutex<HashMap<String, StoredObject>>,
    pending: Mutex<HashMap<String, PendingUpload>>,
    /// Remaining storage calls to reject as credential-expired.
    expirations: AtomicUsize,
    /// Calls to let through before `expirations` starts biting.
    expiration_skip: AtomicUsize,
    next_upload_id: AtomicUsize,
    upload_calls: AtomicUsize,
    create_multipart_calls: AtomicUsize,
    download_calls: AtomicUsize,
    fetch_remote_metadata_calls: AtomicUsize,
    upload_part_calls: AtomicUsize,
    complete_multipart_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    op_delay: Option<Duration>,
}

/// Decrements the in-flight gauge when an operation finishes.
struct Flight<'a>(&'a InMemoryStorageClient);

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every operation open for `delay`, so concurrency tests can
    /// observe overlap.
    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = Some(delay);
        self
    }

    /// Rejects the next `n` storage calls as credential-expired.
    pub fn expire_next(&self, n: usize) {
        self.expirations.store(n, Ordering::SeqCst);
    }

    /// Lets `skip` calls through first, then rejects the next `n` calls as
    /// credential-expired.
    pub fn expire_after(&self, skip: usize, n: usize) {
        self.expiration_skip.store(skip, Ordering::SeqCst);
        self.expirations.store(n, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_remote_metadata_calls(&self) -> usize {
        self.fetch_remote_metadata_calls.load(Ordering::SeqCst)
    }

    pub fn upload_part_calls(&self) -> usize {
        self.upload_part_calls.load(Ordering::SeqCst)
    }

    pub fn create_multipart_calls(&self) -> usize {
        self.create_multipart_calls.load(Ordering::SeqCst)
    }

    pub fn complete_multipart_calls(&self) -> usize {
        self.complete_multipart_calls.load(Ordering::SeqCst)
    }

    /// Highest number of operations observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn object(&self, remote_path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .expect("object map poisoned")
            .get(remote_path)
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("object map poisoned").len()
    }

    pub fn object_paths(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("object map poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Pre-seeds a remote object for download tests.
    pub fn seed_object(&self, remote_path: &str, object: StoredObject) {
        self.objects
            .lock()
            .expect("object map poisoned")
            .insert(remote_path.to_string(), object);
    }

    async fn enter(&self) -> Flight<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let flight = Flight(self);
        if let Some(delay) = self.op_delay {
            tokio::time::sleep(delay).await;
        }
        flight
    }

    /// Consumes one programmed expiry, if any remain after the skip
    /// window.
    fn take_expiration(&self) -> bool {
        if self
            .expiration_skip
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return false;
        }
        self.expirations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StorageClient for InMemoryStorageClient {
    async fn upload(&self, meta: &FileMetadata, body: Bytes) -> StorageResponse {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let _flight = self.enter().await;

        if self.take_expiration() {
            return StorageResponse::CredentialExpired;
        }

        self.seed_object(
            &meta.remote_path,
            StoredObject {
                body: body.to_vec(),
                encryption: meta.encryption.clone(),
                plain_digest: Some(meta.plain_digest.clone()),
                plain_size: Some(meta.src_size),
            },
        );
        StorageResponse::Success(())
    }

    async fn download(&self, meta: &FileMetadata) -> StorageResponse<Bytes> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let _flight = self.enter().await;

        if self.take_expiration() {
            return StorageResponse::CredentialExpired;
        }

        match self.object(&meta.remote_path) {
            Some(object) => StorageResponse::Success(Bytes::from(object.body)),
            None => StorageResponse::Failure(format!(
                "remote file not found: {}",
                meta.remote_path
            )),
        }
    }

    async fn fetch_remote_metadata(&self, remote_path: &str) -> StorageResponse<RemoteFileHeader> {
        self.fetch_remote_metadata_calls.fetch_add(1, Ordering::SeqCst);
        let _flight = self.enter().await;

        if self.take_expiration() {
            return StorageResponse::CredentialExpired;
        }

        let Some(object) = self.object(remote_path) else {
            return StorageResponse::Failure(format!("remote file not found: {remote_path}"));
        };

        let Some(encryption) = object.encryption else {
            return StorageResponse::Failure(format!(
                "remote object {remote_path} is missing its encryption header"
            ));
        };

        StorageResponse::Success(RemoteFileHeader {
            encryption,
            content_length: object.body.len() as u64,
            plain_digest: object.plain_digest,
            plain_size: object.plain_size,
        })
    }

    async fn create_multipart_upload(&self, _meta: &FileMetadata) -> StorageResponse<String> {
        self.create_multipart_calls.fetch_add(1, Ordering::SeqCst);
        let _flight = self.enter().await;

        if self.take_expiration() {
            return StorageResponse::CredentialExpired;
        }

        let id = format!("mpu-{}", self.next_upload_id.fetch_add(1, Ordering::SeqCst));
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(id.clone(), PendingUpload::default());
        StorageResponse::Success(id)
    }

    async fn upload_part(
        &self,
        _meta: &FileMetadata,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResponse<CompletedChunk> {
        self.upload_part_calls.fetch_add(1, Ordering::SeqCst);
        let _flight = self.enter().await;

        if self.take_expiration() {
            return StorageResponse::CredentialExpired;
        }

        let mut pending = self.pending.lock().expect("pending map poisoned");
        let Some(upload) = pending.get_mut(upload_id) else {
            return StorageResponse::Failure(format!("unknown upload id: {upload_id}"));
        };
        upload.parts.insert(part_number, body.to_vec());

        StorageResponse::Success(CompletedChunk {
            part_number,
            etag: format!("etag-{part_number}"),
        })
    }

    async fn complete_multipart_upload(
        &self,
        meta: &FileMetadata,
        upload_id: &str,
        parts: Vec<CompletedChunk>,
    ) -> StorageResponse {
        self.complete_multipart_calls.fetch_add(1, Ordering::SeqCst);
        let _flight = self.enter().await;

        if self.take_expiration() {
            return StorageResponse::CredentialExpired;
        }

        let Some(upload) = self
            .pending
            .lock()
            .expect("pending map poisoned")
            .remove(upload_id)
        else {
            return StorageResponse::Failure(format!("unknown upload id: {upload_id}"));
        };

        if upload.parts.len() != parts.len() {
            return StorageResponse::Failure(format!(
                "block list names {} parts but {} were uploaded",
                parts.len(),
                upload.parts.len()
            ));
        }

        // BTreeMap iteration merges in part order.
        let mut body = Vec::new();
        for part in upload.parts.values() {
            body.extend_from_slice(part);
        }

        self.seed_object(
            &meta.remote_path,
            StoredObject {
                body,
                encryption: meta.encryption.clone(),
                plain_digest: Some(meta.plain_digest.clone()),
                plain_size: Some(meta.src_size),
            },
        );
        StorageResponse::Success(())
    }
}
