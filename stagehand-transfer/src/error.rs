//! Agent-fatal error types.
//!
//! Per-file problems are never errors here — they become `FAILED` entries
//! in the result stream. Only failures that sink the whole execution
//! (command resolution, client construction) surface as `TransferError`.

use crate::resolver::ResolveError;
use stagehand_storage::StorageError;
use thiserror::Error;

/// Result type for agent-level operations.
pub type AgentResult<T> = Result<T, TransferError>;

/// Errors that abort an entire execution.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("empty transfer command")]
    EmptyCommand,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
