//! File transfer agent for staged cloud storage.
//!
//! Drives upload/download commands end to end:
//! - Parses the command through a [`StatementResolver`] collaborator
//! - Builds per-file metadata, pairing encryption material positionally
//! - Encrypts payloads client-side and fans jobs out over a bounded
//!   worker pool, chunking large files
//! - Joins each wave at a completion barrier, then performs at most one
//!   credential renewal before retrying only the expired jobs
//! - Publishes exactly one terminal result per input file through a
//!   pull-based [`TransferResult`] stream

mod agent;
mod config;
mod error;
mod job;
mod prepare;
mod resolver;
mod result;

pub use agent::FileTransferAgent;
pub use config::TransferConfig;
pub use error::{AgentResult, TransferError};
pub use resolver::{ResolveError, StatementResolver};
pub use result::{TransferEntry, TransferResult, TransferStatus};
