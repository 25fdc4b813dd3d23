//! Per-file transfer metadata and envelope-encryption state.

use crate::command::CommandType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Envelope-encryption header stored as provider object metadata.
///
/// The wrapped content key and the payload nonce travel with the object so
/// any holder of the query master key can decrypt after download.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionHeader {
    /// Base64: wrap nonce followed by the encrypted content key.
    pub wrapped_key: String,
    /// Base64: payload nonce.
    pub nonce: String,
}

/// Split plan for a file above the chunk threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub chunk_size: u64,
    pub chunk_count: u32,
}

impl ChunkPlan {
    /// Plans fixed-size chunks over `payload_size` bytes.
    pub fn for_size(payload_size: u64, chunk_size: u64) -> Self {
        let chunk_count = payload_size.div_ceil(chunk_size).max(1) as u32;
        Self {
            chunk_size,
            chunk_count,
        }
    }
}

/// Everything one transfer job knows about its file.
///
/// Built during PREPARE and owned by the job from then on. The encryption
/// header's wrapped key is re-wrapped at renewal for retried uploads; the
/// content key and nonce behind it never change once generated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Local source path (uploads) or remote source name (downloads).
    pub src_path: PathBuf,
    /// Base file name as it appears at the stage.
    pub src_file_name: String,
    /// Full remote key derived from the stage location.
    pub remote_path: String,
    /// Local destination path for downloads.
    pub local_path: Option<PathBuf>,
    pub command: CommandType,
    /// Plaintext size in bytes.
    pub src_size: u64,
    /// Size of the bytes actually sent (encrypted, possibly compressed).
    pub upload_size: u64,
    /// Payload was gzip-compressed before encryption.
    pub compressed: bool,
    /// Hex SHA-256 of the plaintext.
    pub plain_digest: String,
    pub encryption: Option<EncryptionHeader>,
    /// Present for files above the chunk threshold.
    pub chunks: Option<ChunkPlan>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_plan_rounds_up() {
        let plan = ChunkPlan::for_size(100, 30);
        assert_eq!(plan.chunk_count, 4);
        assert_eq!(plan.chunk_size, 30);
    }

    #[test]
    fn chunk_plan_exact_multiple() {
        let plan = ChunkPlan::for_size(90, 30);
        assert_eq!(plan.chunk_count, 3);
    }

    #[test]
    fn chunk_plan_never_zero_chunks() {
        let plan = ChunkPlan::for_size(0, 30);
        assert_eq!(plan.chunk_count, 1);
    }
}
