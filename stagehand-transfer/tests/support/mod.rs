//! Shared test helpers: mocked command resolver, mock-stage parse
//! responses, and pre-encrypted remote objects for download tests.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use stagehand_crypto::{
    encode_nonce, generate_content_key, generate_nonce, seal_payload, wrap_content_key, MasterKey,
};
use stagehand_storage::mock::{InMemoryStorageClient, StoredObject};
use stagehand_storage::StorageClientFactory;
use stagehand_transfer::{
    FileTransferAgent, ResolveError, StatementResolver, TransferConfig,
};
use stagehand_types::{
    CommandType, EncryptionHeader, EncryptionMaterial, ParseResponse, StageCredentials, StageInfo,
    StageType,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Opt-in log output for debugging: `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Command resolver double. Counts parse calls; the renewal call can hand
/// out a different response than the first.
pub struct MockResolver {
    first: ParseResponse,
    renewal: Option<ParseResponse>,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn new(response: ParseResponse) -> Self {
        Self {
            first: response,
            renewal: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Uses `renewal` for every parse call after the first.
    pub fn with_renewal(response: ParseResponse, renewal: ParseResponse) -> Self {
        Self {
            first: response,
            renewal: Some(renewal),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn parse_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatementResolver for MockResolver {
    async fn parse(&self, _command: &str) -> Result<ParseResponse, ResolveError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match (&self.renewal, n) {
            (Some(renewal), calls) if calls > 0 => Ok(renewal.clone()),
            _ => Ok(self.first.clone()),
        }
    }
}

/// Mock stage with a per-test unique prefix.
pub fn mock_stage() -> StageInfo {
    StageInfo {
        stage_type: StageType::Mock,
        location: format!("mock-bucket/queries/{}", Uuid::new_v4()),
        region: "us-east-1".into(),
        endpoint_override: None,
        credentials: StageCredentials::Keys {
            access_key_id: "mock-key".into(),
            secret_access_key: "mock-secret".into(),
            session_token: "mock-token".into(),
            expires_at: None,
        },
    }
}

/// Fresh material with a random 32-byte master key.
pub fn material(smk_id: i64) -> EncryptionMaterial {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    EncryptionMaterial {
        query_stage_master_key: BASE64.encode(key),
        query_id: format!("query-{smk_id}"),
        smk_id,
    }
}

/// Upload response for the given local files, one fresh material each.
pub fn upload_response(src_paths: &[PathBuf], parallel: usize) -> ParseResponse {
    ParseResponse {
        stage_info: mock_stage(),
        encryption_material: (0..src_paths.len()).map(|i| material(i as i64)).collect(),
        src_locations: src_paths
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
        local_location: None,
        command: CommandType::Upload,
        auto_compress: false,
        parallel,
    }
}

/// Download response for the given remote names into `local_dir`.
pub fn download_response(
    stage_info: StageInfo,
    materials: Vec<EncryptionMaterial>,
    src_names: &[&str],
    local_dir: &Path,
    parallel: usize,
) -> ParseResponse {
    ParseResponse {
        stage_info,
        encryption_material: materials,
        src_locations: src_names.iter().map(|s| s.to_string()).collect(),
        local_location: Some(local_dir.to_path_buf()),
        command: CommandType::Download,
        auto_compress: false,
        parallel,
    }
}

/// Small chunk sizes so chunked uploads trigger on tiny files.
pub fn tiny_chunk_config() -> TransferConfig {
    TransferConfig {
        chunk_threshold: 64,
        chunk_size: 16,
    }
}

/// Agent wired to the given client double.
pub fn agent_with(
    resolver: Arc<MockResolver>,
    client: Arc<InMemoryStorageClient>,
    config: TransferConfig,
) -> FileTransferAgent {
    let factory = StorageClientFactory::new();
    factory.inject(client);
    FileTransferAgent::with_factory(resolver, factory, config)
}

/// Writes a file into `dir` and returns its path.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("failed to write test file");
    path
}

/// Encrypts `plaintext` under a fresh content key wrapped with
/// `material`'s master key, and seeds it as a remote object.
pub fn seed_encrypted_object(
    client: &InMemoryStorageClient,
    material: &EncryptionMaterial,
    remote_path: &str,
    plaintext: &[u8],
) {
    let master = MasterKey::from_base64(&material.query_stage_master_key)
        .expect("test material must decode");
    let key = generate_content_key();
    let nonce = generate_nonce();

    let body = seal_payload(&key, &nonce, plaintext).expect("test encryption must succeed");
    let wrapped_key = wrap_content_key(&master, &key).expect("test key wrap must succeed");

    client.seed_object(
        remote_path,
        StoredObject {
            body,
            encryption: Some(EncryptionHeader {
                wrapped_key,
                nonce: encode_nonce(&nonce),
            }),
            plain_digest: Some(hex::encode(Sha256::digest(plaintext))),
            plain_size: Some(plaintext.len() as u64),
        },
    );
}

/// Drains a result stream into (status, src, detail) triples.
pub fn drain(result: &mut stagehand_transfer::TransferResult) -> Vec<(String, String, String)> {
    let mut rows = Vec::new();
    while result.advance() {
        rows.push((
            result.status().to_string(),
            result.src().to_string(),
            result.detail().to_string(),
        ));
    }
    rows
}
