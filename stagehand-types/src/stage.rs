//! Stage location and credential snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage provider backing a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    /// AWS S3 (or any S3-compatible endpoint).
    S3,
    /// SAS-token block blob store.
    Blob,
    /// Test double injected through the client factory.
    Mock,
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageType::S3 => write!(f, "s3"),
            StageType::Blob => write!(f, "blob"),
            StageType::Mock => write!(f, "mock"),
        }
    }
}

/// Provider credentials for a stage.
///
/// `expires_at` is advisory: clients use it as a fast-path pre-check before
/// issuing a request that is certain to be rejected. The authoritative
/// expiry signal is the provider's response classification.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum StageCredentials {
    /// Access-key credentials for S3-style stages.
    Keys {
        access_key_id: String,
        secret_access_key: String,
        session_token: String,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
    /// Shared-access-signature token for blob stages.
    SharedAccessSignature {
        token: String,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
}

impl StageCredentials {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            StageCredentials::Keys { expires_at, .. } => *expires_at,
            StageCredentials::SharedAccessSignature { expires_at, .. } => *expires_at,
        }
    }

    /// Returns true if the snapshot carries an expiry timestamp in the past.
    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|t| Utc::now() >= t)
    }
}

/// A staged remote storage location plus the credentials to reach it.
///
/// Immutable snapshot; renewal produces a fresh `StageInfo` and the old one
/// is dropped once in-flight jobs finish with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageInfo {
    pub stage_type: StageType,
    /// `bucket/prefix` (S3) or `container/prefix` (blob).
    pub location: String,
    pub region: String,
    /// Endpoint override for S3-compatible servers (MinIO in testing).
    pub endpoint_override: Option<String>,
    pub credentials: StageCredentials,
}

impl StageInfo {
    /// Bucket or container component of the location.
    pub fn bucket(&self) -> &str {
        match self.location.split_once('/') {
            Some((bucket, _)) => bucket,
            None => &self.location,
        }
    }

    /// Key prefix component of the location, without a trailing slash.
    pub fn prefix(&self) -> &str {
        match self.location.split_once('/') {
            Some((_, prefix)) => prefix.trim_end_matches('/'),
            None => "",
        }
    }

    /// Full remote key for a file staged at this location.
    pub fn remote_path_for(&self, file_name: &str) -> String {
        let prefix = self.prefix();
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }
}
