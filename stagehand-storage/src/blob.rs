//! SAS-token block blob storage client.
//!
//! Talks plain HTTPS to a block-blob endpoint: single-shot puts for small
//! objects, put-block / put-block-list for chunked uploads. The SAS token
//! rides the query string; a 403 from the provider means the signature went
//! stale and is reported as `CredentialExpired`.

use crate::client::{
    header_from_metadata, object_metadata, CompletedChunk, RemoteFileHeader, StorageClient,
    StorageResponse,
};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use stagehand_types::{FileMetadata, StageCredentials, StageInfo};
use tracing::debug;
use uuid::Uuid;

/// Metadata header prefix used by the blob endpoint.
const META_HEADER_PREFIX: &str = "x-ms-meta-";

/// Block blob client bound to one stage snapshot.
#[derive(Debug)]
pub struct BlobStorageClient {
    http: Client,
    /// `{endpoint}/{container}`, no trailing slash.
    container_url: String,
    sas_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl BlobStorageClient {
    pub fn new(stage: &StageInfo, parallel: usize) -> StorageResult<Self> {
        let StageCredentials::SharedAccessSignature { token, expires_at } = &stage.credentials
        else {
            return Err(StorageError::InvalidStage(
                "blob stage requires a shared access signature".to_string(),
            ));
        };

        let Some(endpoint) = &stage.endpoint_override else {
            return Err(StorageError::InvalidStage(
                "blob stage requires an endpoint".to_string(),
            ));
        };

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(parallel.max(1))
            .build()
            .expect("failed to build HTTP client");

        Ok(Self {
            http,
            container_url: format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                stage.bucket()
            ),
            sas_token: token.clone(),
            expires_at: *expires_at,
        })
    }

    fn credentials_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Utc::now() >= t)
    }

    /// `{container}/{path}?{sas}` — extra query params appended after the
    /// token.
    fn object_url(&self, remote_path: &str, extra_query: &str) -> String {
        let mut url = format!("{}/{remote_path}?{}", self.container_url, self.sas_token);
        if !extra_query.is_empty() {
            url.push('&');
            url.push_str(extra_query);
        }
        url
    }

    fn metadata_headers(meta: &FileMetadata) -> Vec<(String, String)> {
        object_metadata(meta)
            .into_iter()
            .map(|(name, value)| (format!("{META_HEADER_PREFIX}{name}"), value))
            .collect()
    }
}

#[async_trait]
impl StorageClient for BlobStorageClient {
    async fn upload(&self, meta: &FileMetadata, body: Bytes) -> StorageResponse {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let size = body.len();
        let url = self.object_url(&meta.remote_path, "");
        let mut request = self
            .http
            .put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .body(body);
        for (name, value) in Self::metadata_headers(meta) {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("uploaded {size} bytes to blob {}", meta.remote_path);
                StorageResponse::Success(())
            }
            Ok(resp) => classify_status("upload", &meta.remote_path, resp.status()),
            Err(e) => StorageResponse::Failure(format!(
                "upload failed for {}: {e}",
                meta.remote_path
            )),
        }
    }

    async fn download(&self, meta: &FileMetadata) -> StorageResponse<Bytes> {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let url = self.object_url(&meta.remote_path, "");
        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return StorageResponse::Failure(format!(
                    "download failed for {}: {e}",
                    meta.remote_path
                ));
            }
        };

        if resp.status() == StatusCode::NOT_FOUND {
            return StorageResponse::Failure(format!(
                "remote file not found: {}",
                meta.remote_path
            ));
        }
        if !resp.status().is_success() {
            return classify_status("download", &meta.remote_path, resp.status());
        }

        match resp.bytes().await {
            Ok(bytes) => {
                debug!("downloaded {} bytes from blob {}", bytes.len(), meta.remote_path);
                StorageResponse::Success(bytes)
            }
            Err(e) => StorageResponse::Failure(format!(
                "failed to read body for {}: {e}",
                meta.remote_path
            )),
        }
    }

    async fn fetch_remote_metadata(&self, remote_path: &str) -> StorageResponse<RemoteFileHeader> {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let url = self.object_url(remote_path, "");
        let resp = match self.http.head(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return StorageResponse::Failure(format!(
                    "fetch remote metadata failed for {remote_path}: {e}"
                ));
            }
        };

        if resp.status() == StatusCode::NOT_FOUND {
            return StorageResponse::Failure(format!("remote file not found: {remote_path}"));
        }
        if !resp.status().is_success() {
            return classify_status("fetch remote metadata", remote_path, resp.status());
        }

        let content_length = resp.content_length().unwrap_or(0);
        let headers = resp.headers().clone();
        header_from_metadata(
            remote_path,
            |name| {
                headers
                    .get(format!("{META_HEADER_PREFIX}{name}"))
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string())
            },
            content_length,
        )
    }

    async fn create_multipart_upload(&self, _meta: &FileMetadata) -> StorageResponse<String> {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        // Block blobs have no server-side initiation; the upload id only
        // namespaces the client-generated block ids.
        StorageResponse::Success(Uuid::new_v4().to_string())
    }

    async fn upload_part(
        &self,
        meta: &FileMetadata,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResponse<CompletedChunk> {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        // Block ids within one blob must have equal length; the fixed-width
        // part number keeps them sortable too.
        let block_id = BASE64.encode(format!("{upload_id}-{part_number:06}"));
        let query = format!("comp=block&blockid={}", urlencode(&block_id));
        let url = self.object_url(&meta.remote_path, &query);

        match self.http.put(&url).body(body).send().await {
            Ok(resp) if resp.status().is_success() => StorageResponse::Success(CompletedChunk {
                part_number,
                etag: block_id,
            }),
            Ok(resp) => classify_status("upload part", &meta.remote_path, resp.status()),
            Err(e) => StorageResponse::Failure(format!(
                "upload part {part_number} failed for {}: {e}",
                meta.remote_path
            )),
        }
    }

    async fn complete_multipart_upload(
        &self,
        meta: &FileMetadata,
        _upload_id: &str,
        parts: Vec<CompletedChunk>,
    ) -> StorageResponse {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let mut ordered = parts;
        ordered.sort_by_key(|p| p.part_number);

        let mut block_list = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
        for part in &ordered {
            block_list.push_str("<Latest>");
            block_list.push_str(&part.etag);
            block_list.push_str("</Latest>");
        }
        block_list.push_str("</BlockList>");

        let url = self.object_url(&meta.remote_path, "comp=blocklist");
        // Metadata rides the block list commit; blocks themselves carry
        // none.
        let mut request = self.http.put(&url).body(block_list);
        for (name, value) in Self::metadata_headers(meta) {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("committed block list for blob {}", meta.remote_path);
                StorageResponse::Success(())
            }
            Ok(resp) => classify_status("commit block list", &meta.remote_path, resp.status()),
            Err(e) => StorageResponse::Failure(format!(
                "commit block list failed for {}: {e}",
                meta.remote_path
            )),
        }
    }
}

/// A 403 on a SAS request means the signature is stale or revoked.
fn classify_status<T>(op: &str, key: &str, status: StatusCode) -> StorageResponse<T> {
    if status == StatusCode::FORBIDDEN {
        debug!("{op} for {key} rejected with stale shared access signature");
        return StorageResponse::CredentialExpired;
    }
    StorageResponse::Failure(format!("{op} failed for {key}: HTTP {status}"))
}

/// Minimal percent-encoding for base64 block ids (`+`, `/`, `=`).
fn urlencode(raw: &str) -> String {
    raw.replace('%', "%25")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_types::StageType;

    fn blob_stage() -> StageInfo {
        StageInfo {
            stage_type: StageType::Blob,
            location: "container/inbound".into(),
            region: "westeurope".into(),
            endpoint_override: Some("https://acct.blob.example.net/".into()),
            credentials: StageCredentials::SharedAccessSignature {
                token: "sv=2024&sig=abc".into(),
                expires_at: None,
            },
        }
    }

    #[test]
    fn object_url_joins_container_token_and_extra_query() {
        let client = BlobStorageClient::new(&blob_stage(), 4).unwrap();
        assert_eq!(
            client.object_url("inbound/data.csv", ""),
            "https://acct.blob.example.net/container/inbound/data.csv?sv=2024&sig=abc"
        );
        assert_eq!(
            client.object_url("inbound/data.csv", "comp=blocklist"),
            "https://acct.blob.example.net/container/inbound/data.csv?sv=2024&sig=abc&comp=blocklist"
        );
    }

    #[test]
    fn requires_sas_credentials() {
        let mut stage = blob_stage();
        stage.credentials = StageCredentials::Keys {
            access_key_id: "AKIATEST".into(),
            secret_access_key: "secret".into(),
            session_token: "token".into(),
            expires_at: None,
        };
        assert!(matches!(
            BlobStorageClient::new(&stage, 4),
            Err(StorageError::InvalidStage(_))
        ));
    }

    #[test]
    fn requires_endpoint() {
        let mut stage = blob_stage();
        stage.endpoint_override = None;
        assert!(matches!(
            BlobStorageClient::new(&stage, 4),
            Err(StorageError::InvalidStage(_))
        ));
    }

    #[test]
    fn forbidden_maps_to_credential_expired() {
        let resp: StorageResponse = classify_status("upload", "k", StatusCode::FORBIDDEN);
        assert!(resp.is_credential_expired());

        let resp: StorageResponse = classify_status("upload", "k", StatusCode::BAD_REQUEST);
        assert!(matches!(resp, StorageResponse::Failure(_)));
    }

    #[test]
    fn block_ids_urlencode_base64_padding() {
        assert_eq!(urlencode("YWJj+/=="), "YWJj%2B%2F%3D%3D");
    }
}
