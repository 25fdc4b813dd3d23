//! Per-job outcome of one transfer attempt.

use serde::{Deserialize, Serialize};

/// Terminal classification of a single transfer attempt.
///
/// `CredentialExpired` is a recoverable value, not an error: the agent
/// regroups expired jobs after the wave barrier and retries them once
/// against renewed credentials. A second expiry for the same job is
/// reported as `Failure`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    Success,
    CredentialExpired,
    Failure(String),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }

    pub fn is_credential_expired(&self) -> bool {
        matches!(self, TransferOutcome::CredentialExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_predicates() {
        assert!(TransferOutcome::Success.is_success());
        assert!(TransferOutcome::CredentialExpired.is_credential_expired());
        assert!(!TransferOutcome::Failure("boom".into()).is_success());
        assert!(!TransferOutcome::Failure("boom".into()).is_credential_expired());
    }
}
