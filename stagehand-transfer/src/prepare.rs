//! PREPARE: per-file metadata construction and local validation.
//!
//! Everything that can be rejected without a network call is rejected
//! here: unreadable sources, unwritable destinations, missing or malformed
//! encryption material. Files that fail preparation are terminal before
//! dispatch and never reach the worker pool.

use crate::config::TransferConfig;
use crate::job::TransferJob;
use stagehand_crypto::{
    encode_nonce, generate_content_key, generate_nonce, wrap_content_key, MasterKey,
};
use stagehand_types::{
    ChunkPlan, CommandType, EncryptionHeader, EncryptionMaterial, FileMetadata, ParseResponse,
    TransferOutcome,
};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A file with a terminal outcome (used for prepare failures and settled
/// jobs alike).
pub(crate) struct FinishedFile {
    pub index: usize,
    pub meta: FileMetadata,
    pub outcome: TransferOutcome,
}

/// Output of the prepare step: jobs ready to dispatch plus files that
/// already failed.
pub(crate) struct Prepared {
    pub pending: Vec<TransferJob>,
    pub failed: Vec<FinishedFile>,
}

/// Builds one job per source location, pairing encryption material by
/// position.
pub(crate) async fn prepare_jobs(response: &ParseResponse, config: &TransferConfig) -> Prepared {
    let mut prepared = Prepared {
        pending: Vec::with_capacity(response.src_locations.len()),
        failed: Vec::new(),
    };

    // Validated once; a failure applies to every file of a download
    // command. Uploads never read this.
    let download_dir = match response.command {
        CommandType::Download => validate_download_dir(response.local_location.as_deref()).await,
        CommandType::Upload => Ok(PathBuf::new()),
    };

    for (index, src) in response.src_locations.iter().enumerate() {
        let material = response.encryption_material.get(index);
        let result = match response.command {
            CommandType::Upload => {
                prepare_upload(index, src, material, response, config).await
            }
            CommandType::Download => match &download_dir {
                Ok(dir) => prepare_download(index, src, material, response, dir),
                Err(reason) => Err(reason.clone()),
            },
        };

        match result {
            Ok(job) => prepared.pending.push(job),
            Err(reason) => {
                warn!("prepare failed for {src}: {reason}");
                prepared.failed.push(FinishedFile {
                    index,
                    meta: failed_meta(src, response.command),
                    outcome: TransferOutcome::Failure(reason),
                });
            }
        }
    }

    debug!(
        "prepared {} job(s), {} file(s) failed locally",
        prepared.pending.len(),
        prepared.failed.len()
    );
    prepared
}

async fn prepare_upload(
    index: usize,
    src: &str,
    material: Option<&EncryptionMaterial>,
    response: &ParseResponse,
    config: &TransferConfig,
) -> Result<TransferJob, String> {
    let src_path = PathBuf::from(src);
    let Some(file_name) = src_path.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return Err(format!("source location has no file name: {src}"));
    };

    let master = master_key(src, material)?;
    let material = material.cloned();

    let stat = tokio::fs::metadata(&src_path)
        .await
        .map_err(|e| format!("cannot read source file {src}: {e}"))?;
    if !stat.is_file() {
        return Err(format!("source is not a regular file: {src}"));
    }

    let staged_name = if response.auto_compress {
        format!("{file_name}.gz")
    } else {
        file_name
    };

    let content_key = generate_content_key();
    let payload_nonce = generate_nonce();
    let wrapped_key =
        wrap_content_key(&master, &content_key).map_err(|e| format!("key wrap for {src}: {e}"))?;

    let meta = FileMetadata {
        remote_path: response.stage_info.remote_path_for(&staged_name),
        src_path,
        src_file_name: staged_name,
        local_path: None,
        command: CommandType::Upload,
        src_size: stat.len(),
        upload_size: 0,
        compressed: response.auto_compress,
        plain_digest: String::new(),
        encryption: Some(EncryptionHeader {
            wrapped_key,
            nonce: encode_nonce(&payload_nonce),
        }),
        // Provisional plan from the raw size; the job refines it once the
        // ciphertext length is known.
        chunks: (stat.len() > config.chunk_threshold)
            .then(|| ChunkPlan::for_size(stat.len(), config.chunk_size.max(1))),
    };

    Ok(TransferJob {
        index,
        meta,
        content_key: Some(content_key),
        payload_nonce: Some(payload_nonce),
        material,
    })
}

fn prepare_download(
    index: usize,
    src: &str,
    material: Option<&EncryptionMaterial>,
    response: &ParseResponse,
    download_dir: &Path,
) -> Result<TransferJob, String> {
    // Validates the material early so malformed keys fail before any
    // network call.
    master_key(src, material)?;

    let Some(file_name) = Path::new(src).file_name() else {
        return Err(format!("source location has no file name: {src}"));
    };

    let meta = FileMetadata {
        src_path: PathBuf::from(src),
        src_file_name: src.to_string(),
        remote_path: response.stage_info.remote_path_for(src),
        local_path: Some(download_dir.join(file_name)),
        command: CommandType::Download,
        src_size: 0,
        upload_size: 0,
        compressed: false,
        plain_digest: String::new(),
        encryption: None,
        chunks: None,
    };

    Ok(TransferJob {
        index,
        meta,
        content_key: None,
        payload_nonce: None,
        material: material.cloned(),
    })
}

fn master_key(src: &str, material: Option<&EncryptionMaterial>) -> Result<MasterKey, String> {
    let Some(material) = material else {
        return Err(format!("no encryption material for {src}"));
    };
    MasterKey::from_base64(&material.query_stage_master_key)
        .map_err(|e| format!("master key for {src}: {e}"))
}

async fn validate_download_dir(dir: Option<&Path>) -> Result<PathBuf, String> {
    let Some(dir) = dir else {
        return Err("download command has no local destination".to_string());
    };

    let stat = tokio::fs::metadata(dir)
        .await
        .map_err(|e| format!("local destination {}: {e}", dir.display()))?;
    if !stat.is_dir() {
        return Err(format!("local destination is not a directory: {}", dir.display()));
    }
    if stat.permissions().readonly() {
        return Err(format!("local destination is not writable: {}", dir.display()));
    }

    Ok(dir.to_path_buf())
}

/// Minimal metadata for a file that never got past preparation.
fn failed_meta(src: &str, command: CommandType) -> FileMetadata {
    let name = Path::new(src)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| src.to_string());

    FileMetadata {
        src_path: PathBuf::from(src),
        src_file_name: name,
        remote_path: String::new(),
        local_path: None,
        command,
        src_size: 0,
        upload_size: 0,
        compressed: false,
        plain_digest: String::new(),
        encryption: None,
        chunks: None,
    }
}
