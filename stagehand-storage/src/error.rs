//! Storage configuration errors.
//!
//! Provider-level request failures are not errors at this layer — they are
//! [`StorageResponse`](crate::client::StorageResponse) values. Only broken
//! configuration that no retry can fix surfaces here.

use stagehand_types::StageType;
use thiserror::Error;

/// Result type for storage client construction.
pub type StorageResult<T> = Result<T, StorageError>;

/// Fatal configuration errors at client construction.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported stage type: {0}")]
    UnsupportedStageType(StageType),

    #[error("invalid stage configuration: {0}")]
    InvalidStage(String),
}
