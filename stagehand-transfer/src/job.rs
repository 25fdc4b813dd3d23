//! Per-file transfer job execution.
//!
//! A job owns its [`FileMetadata`] for the duration of an attempt and hands
//! it back with the attempt's outcome. Worker-pool permits are held only
//! for the span of a single storage-client call, so the configured
//! parallelism bounds concurrent provider traffic exactly — including the
//! chunk fan-out of large files, whose parts each take their own permit.

use crate::config::TransferConfig;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use stagehand_crypto::{
    decode_nonce, open_payload, seal_payload, unwrap_content_key, ContentKey, MasterKey,
    NONCE_SIZE,
};
use stagehand_storage::{CompletedChunk, StorageClient, StorageResponse};
use stagehand_types::{
    ChunkPlan, CommandType, EncryptionMaterial, FileMetadata, StageInfo, TransferOutcome,
};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// One file's transfer state, owned by its job across attempts.
pub(crate) struct TransferJob {
    /// Position in the input file list; also the encryption-material index.
    pub index: usize,
    pub meta: FileMetadata,
    /// Content key generated at prepare time (uploads only). Survives
    /// renewal — only its wrap changes.
    pub content_key: Option<ContentKey>,
    pub payload_nonce: Option<[u8; NONCE_SIZE]>,
    /// Material snapshot for decrypt (downloads only).
    pub material: Option<EncryptionMaterial>,
}

impl TransferJob {
    /// Rebinds the job to a renewed stage snapshot before its retry.
    ///
    /// Uploads get their content key re-wrapped under the new master key;
    /// downloads swap in the new material for decrypt. The content key and
    /// payload nonce themselves never change.
    pub fn refresh(
        &mut self,
        stage: &StageInfo,
        material: Option<&EncryptionMaterial>,
    ) -> Result<(), String> {
        let Some(material) = material else {
            return Err(format!(
                "no encryption material for {} after renewal",
                self.meta.src_file_name
            ));
        };

        let master = MasterKey::from_base64(&material.query_stage_master_key)
            .map_err(|e| format!("renewed master key for {}: {e}", self.meta.src_file_name))?;

        self.meta.remote_path = stage.remote_path_for(&self.meta.src_file_name);

        match self.meta.command {
            CommandType::Upload => {
                let Some(key) = &self.content_key else {
                    return Err(format!(
                        "upload job for {} lost its content key",
                        self.meta.src_file_name
                    ));
                };
                let wrapped = stagehand_crypto::wrap_content_key(&master, key)
                    .map_err(|e| format!("re-wrap for {}: {e}", self.meta.src_file_name))?;
                if let Some(encryption) = &mut self.meta.encryption {
                    encryption.wrapped_key = wrapped;
                }
            }
            CommandType::Download => {
                self.material = Some(material.clone());
            }
        }
        Ok(())
    }
}

/// Runs one attempt of a job and returns it with the attempt's outcome.
pub(crate) async fn run(
    mut job: TransferJob,
    client: Arc<dyn StorageClient>,
    pool: Arc<Semaphore>,
    config: TransferConfig,
) -> (TransferJob, TransferOutcome) {
    let outcome = match job.meta.command {
        CommandType::Upload => run_upload(&mut job, &client, &pool, &config).await,
        CommandType::Download => run_download(&mut job, &client, &pool).await,
    };
    debug!(
        "job for {} finished with {:?}",
        job.meta.src_file_name, outcome
    );
    (job, outcome)
}

async fn run_upload(
    job: &mut TransferJob,
    client: &Arc<dyn StorageClient>,
    pool: &Arc<Semaphore>,
    config: &TransferConfig,
) -> TransferOutcome {
    let (Some(key), Some(nonce)) = (job.content_key.clone(), job.payload_nonce) else {
        return TransferOutcome::Failure(format!(
            "upload job for {} has no content key",
            job.meta.src_file_name
        ));
    };

    let plaintext = match tokio::fs::read(&job.meta.src_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return TransferOutcome::Failure(format!(
                "cannot read source file {}: {e}",
                job.meta.src_path.display()
            ));
        }
    };
    job.meta.src_size = plaintext.len() as u64;

    let payload = if job.meta.compressed {
        match gzip(&plaintext) {
            Ok(compressed) => compressed,
            Err(reason) => return TransferOutcome::Failure(reason),
        }
    } else {
        plaintext
    };

    // Digest of the payload as it will decrypt on the other side (i.e.
    // after compression, before encryption).
    job.meta.plain_digest = hex::encode(Sha256::digest(&payload));

    let ciphertext = match seal_payload(&key, &nonce, &payload) {
        Ok(ciphertext) => Bytes::from(ciphertext),
        Err(e) => {
            return TransferOutcome::Failure(format!(
                "encryption failed for {}: {e}",
                job.meta.src_file_name
            ));
        }
    };
    job.meta.upload_size = ciphertext.len() as u64;

    if job.meta.upload_size > config.chunk_threshold {
        run_chunked_upload(job, client, pool, config, ciphertext).await
    } else {
        job.meta.chunks = None;
        let response = {
            let _permit = match pool.acquire().await {
                Ok(permit) => permit,
                Err(_) => return pool_closed(),
            };
            client.upload(&job.meta, ciphertext).await
        };
        response.outcome()
    }
}

/// Uploads one file as fixed-size chunks and commits the merge.
///
/// All chunks must succeed within this attempt for the commit to run. A
/// credential expiry in any chunk abandons the attempt as a whole; the
/// retry restarts the chunked upload from scratch, keyed by the parent
/// file.
async fn run_chunked_upload(
    job: &mut TransferJob,
    client: &Arc<dyn StorageClient>,
    pool: &Arc<Semaphore>,
    config: &TransferConfig,
    ciphertext: Bytes,
) -> TransferOutcome {
    let plan = ChunkPlan::for_size(ciphertext.len() as u64, config.chunk_size.max(1));
    job.meta.chunks = Some(plan);

    let init = {
        let _permit = match pool.acquire().await {
            Ok(permit) => permit,
            Err(_) => return pool_closed(),
        };
        client.create_multipart_upload(&job.meta).await
    };
    let upload_id = match init {
        StorageResponse::Success(id) => id,
        StorageResponse::CredentialExpired => return TransferOutcome::CredentialExpired,
        StorageResponse::Failure(reason) => return TransferOutcome::Failure(reason),
    };

    let mut set: JoinSet<StorageResponse<CompletedChunk>> = JoinSet::new();
    for part_index in 0..plan.chunk_count as u64 {
        let start = (part_index * plan.chunk_size) as usize;
        let end = (((part_index + 1) * plan.chunk_size) as usize).min(ciphertext.len());
        let body = ciphertext.slice(start..end);

        let client = Arc::clone(client);
        let pool = Arc::clone(pool);
        let meta = job.meta.clone();
        let upload_id = upload_id.clone();
        set.spawn(async move {
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return StorageResponse::Failure("worker pool closed".to_string()),
            };
            client
                .upload_part(&meta, &upload_id, part_index as i32 + 1, body)
                .await
        });
    }

    let mut parts = Vec::with_capacity(plan.chunk_count as usize);
    let mut expired = false;
    let mut failure: Option<String> = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(StorageResponse::Success(chunk)) => parts.push(chunk),
            Ok(StorageResponse::CredentialExpired) => expired = true,
            Ok(StorageResponse::Failure(reason)) => failure = Some(reason),
            Err(e) => failure = Some(format!("chunk task failed: {e}")),
        }
    }

    // Expiry outranks other chunk failures: the whole file is retried as
    // one unit after renewal.
    if expired {
        warn!(
            "chunked upload for {} hit expired credentials",
            job.meta.src_file_name
        );
        return TransferOutcome::CredentialExpired;
    }
    if let Some(reason) = failure {
        return TransferOutcome::Failure(reason);
    }

    let commit = {
        let _permit = match pool.acquire().await {
            Ok(permit) => permit,
            Err(_) => return pool_closed(),
        };
        client
            .complete_multipart_upload(&job.meta, &upload_id, parts)
            .await
    };
    commit.outcome()
}

async fn run_download(
    job: &mut TransferJob,
    client: &Arc<dyn StorageClient>,
    pool: &Arc<Semaphore>,
) -> TransferOutcome {
    // Remote headers carry the wrapped key and nonce; nothing can decrypt
    // without them.
    let fetched = {
        let _permit = match pool.acquire().await {
            Ok(permit) => permit,
            Err(_) => return pool_closed(),
        };
        client.fetch_remote_metadata(&job.meta.remote_path).await
    };
    let header = match fetched {
        StorageResponse::Success(header) => header,
        StorageResponse::CredentialExpired => return TransferOutcome::CredentialExpired,
        StorageResponse::Failure(reason) => return TransferOutcome::Failure(reason),
    };
    job.meta.encryption = Some(header.encryption.clone());

    let downloaded = {
        let _permit = match pool.acquire().await {
            Ok(permit) => permit,
            Err(_) => return pool_closed(),
        };
        client.download(&job.meta).await
    };
    let body = match downloaded {
        StorageResponse::Success(body) => body,
        StorageResponse::CredentialExpired => return TransferOutcome::CredentialExpired,
        StorageResponse::Failure(reason) => return TransferOutcome::Failure(reason),
    };
    job.meta.upload_size = body.len() as u64;

    let Some(material) = &job.material else {
        return TransferOutcome::Failure(format!(
            "download job for {} has no encryption material",
            job.meta.src_file_name
        ));
    };

    let payload = match decrypt_payload(material, &header.encryption, &body) {
        Ok(payload) => payload,
        Err(reason) => {
            return TransferOutcome::Failure(format!(
                "decrypt failed for {}: {reason}",
                job.meta.src_file_name
            ));
        }
    };

    if let Some(expected) = header.plain_digest.as_deref() {
        if !expected.is_empty() && expected != hex::encode(Sha256::digest(&payload)) {
            return TransferOutcome::Failure(format!(
                "digest mismatch after decrypt for {}",
                job.meta.src_file_name
            ));
        }
    }
    job.meta.src_size = payload.len() as u64;

    let Some(local_path) = job.meta.local_path.clone() else {
        return TransferOutcome::Failure(format!(
            "download job for {} has no local destination",
            job.meta.src_file_name
        ));
    };
    if let Err(e) = tokio::fs::write(&local_path, &payload).await {
        return TransferOutcome::Failure(format!(
            "cannot write {}: {e}",
            local_path.display()
        ));
    }

    TransferOutcome::Success
}

fn decrypt_payload(
    material: &EncryptionMaterial,
    encryption: &stagehand_types::EncryptionHeader,
    body: &[u8],
) -> Result<Vec<u8>, String> {
    let master = MasterKey::from_base64(&material.query_stage_master_key)
        .map_err(|e| e.to_string())?;
    let key = unwrap_content_key(&master, &encryption.wrapped_key).map_err(|e| e.to_string())?;
    let nonce = decode_nonce(&encryption.nonce).map_err(|e| e.to_string())?;
    open_payload(&key, &nonce, body).map_err(|e| e.to_string())
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| format!("compression failed: {e}"))?;
    encoder
        .finish()
        .map_err(|e| format!("compression failed: {e}"))
}

fn pool_closed() -> TransferOutcome {
    TransferOutcome::Failure("worker pool closed".to_string())
}
