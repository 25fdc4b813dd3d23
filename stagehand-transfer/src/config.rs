//! Transfer engine configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the transfer agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Payloads above this size (bytes) upload as fixed-size chunks.
    pub chunk_threshold: u64,

    /// Chunk size (bytes) for chunked uploads.
    pub chunk_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 64 * 1024 * 1024, // 64 MiB
            chunk_size: 8 * 1024 * 1024,       // 8 MiB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_size_divides_threshold() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_threshold % config.chunk_size, 0);
    }

    #[test]
    fn config_json_roundtrip() {
        let config = TransferConfig {
            chunk_threshold: 1024,
            chunk_size: 256,
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: TransferConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.chunk_threshold, 1024);
        assert_eq!(restored.chunk_size, 256);
    }
}
