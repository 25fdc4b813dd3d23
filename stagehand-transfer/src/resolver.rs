//! Command resolver collaborator interface.

use async_trait::async_trait;
use stagehand_types::ParseResponse;
use thiserror::Error;

/// Errors from command resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not a transfer command: {0}")]
    NotTransferCommand(String),

    #[error("command parse failed: {0}")]
    Parse(String),
}

/// Resolves a transfer command into stage, credentials, and key material.
///
/// The agent invokes `parse` once at the start of an execution and at most
/// once more when the provider reports expired staging credentials. Every
/// call must return a fresh snapshot — in particular, the renewal call is
/// expected to carry new credentials and new key material.
#[async_trait]
pub trait StatementResolver: Send + Sync {
    async fn parse(&self, command: &str) -> Result<ParseResponse, ResolveError>;
}
