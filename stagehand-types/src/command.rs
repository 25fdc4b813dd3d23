//! Parsed transfer command: what to move, where, and with which keys.

use crate::stage::StageInfo;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Direction of a transfer command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Upload,
    Download,
}

/// Query-scoped key material for one source file.
///
/// The master key wraps each file's content-encryption key. One material
/// entry corresponds positionally to one source location in the parse
/// response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptionMaterial {
    /// Base64-encoded query-scoped master key.
    pub query_stage_master_key: String,
    pub query_id: String,
    pub smk_id: i64,
}

/// Everything the command resolver extracted from one transfer command.
///
/// Produced fresh by every parse call — the initial one and the single
/// renewal — and swapped as a unit, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParseResponse {
    pub stage_info: StageInfo,
    /// Positionally paired with `src_locations`.
    pub encryption_material: Vec<EncryptionMaterial>,
    /// Local paths (upload) or remote file names (download).
    pub src_locations: Vec<String>,
    /// Destination directory for downloads.
    pub local_location: Option<PathBuf>,
    pub command: CommandType,
    /// Gzip-compress upload payloads before encryption.
    pub auto_compress: bool,
    /// Maximum number of concurrent storage calls.
    pub parallel: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{StageCredentials, StageType};

    #[test]
    fn parse_response_json_roundtrip() {
        let response = ParseResponse {
            stage_info: StageInfo {
                stage_type: StageType::S3,
                location: "bucket/stage".into(),
                region: "us-east-1".into(),
                endpoint_override: None,
                credentials: StageCredentials::Keys {
                    access_key_id: "AKIATEST".into(),
                    secret_access_key: "secret".into(),
                    session_token: "token".into(),
                    expires_at: None,
                },
            },
            encryption_material: vec![EncryptionMaterial {
                query_stage_master_key: "AAAA".into(),
                query_id: "q-1".into(),
                smk_id: 1234,
            }],
            src_locations: vec!["/tmp/data.csv".into()],
            local_location: None,
            command: CommandType::Upload,
            auto_compress: false,
            parallel: 4,
        };

        let json = serde_json::to_string(&response).unwrap();
        let restored: ParseResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.command, CommandType::Upload);
        assert_eq!(restored.encryption_material.len(), 1);
        assert_eq!(restored.src_locations, response.src_locations);
    }
}
