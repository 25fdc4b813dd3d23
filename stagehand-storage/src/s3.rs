//! S3 storage client.
//!
//! Builds a fresh SDK client from the stage's credential snapshot per call
//! and classifies service errors: stale-token rejections become
//! `CredentialExpired`, everything else is a terminal per-call failure.

use crate::client::{
    header_from_metadata, object_metadata, CompletedChunk, RemoteFileHeader, StorageClient,
    StorageResponse,
};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use stagehand_types::{FileMetadata, StageCredentials, StageInfo};
use tracing::debug;

/// Service error codes that mean the staging credentials went stale.
const EXPIRY_CODES: [&str; 3] = ["ExpiredToken", "ExpiredTokenException", "InvalidToken"];

/// S3 client bound to one stage snapshot.
#[derive(Debug)]
pub struct S3StorageClient {
    bucket: String,
    region: String,
    endpoint_override: Option<String>,
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    /// Advisory expiry carried by the snapshot; the provider response is
    /// the authoritative signal.
    expires_at: Option<DateTime<Utc>>,
}

impl S3StorageClient {
    pub fn new(stage: &StageInfo) -> StorageResult<Self> {
        let StageCredentials::Keys {
            access_key_id,
            secret_access_key,
            session_token,
            expires_at,
        } = &stage.credentials
        else {
            return Err(StorageError::InvalidStage(
                "s3 stage requires access-key credentials".to_string(),
            ));
        };

        Ok(Self {
            bucket: stage.bucket().to_string(),
            region: stage.region.clone(),
            endpoint_override: stage.endpoint_override.clone(),
            access_key_id: access_key_id.clone(),
            secret_access_key: secret_access_key.clone(),
            session_token: session_token.clone(),
            expires_at: *expires_at,
        })
    }

    fn credentials_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Utc::now() >= t)
    }

    /// Builds an SDK client from the credential snapshot.
    fn build_client(&self) -> S3Client {
        let credentials = aws_credential_types::Credentials::new(
            &self.access_key_id,
            &self.secret_access_key,
            Some(self.session_token.clone()),
            None,
            "stagehand-stage",
        );

        let mut config_builder = aws_sdk_s3::Config::builder()
            .region(aws_types::region::Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .behavior_version_latest();

        if let Some(ref endpoint) = self.endpoint_override {
            config_builder = config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        S3Client::from_conf(config_builder.build())
    }
}

#[async_trait]
impl StorageClient for S3StorageClient {
    async fn upload(&self, meta: &FileMetadata, body: Bytes) -> StorageResponse {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let client = self.build_client();
        let size = body.len();
        let key = &meta.remote_path;

        match client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_metadata(Some(object_metadata(meta).into_iter().collect()))
            .body(ByteStream::from(body))
            .send()
            .await
        {
            Ok(_) => {
                debug!("uploaded {size} bytes to s3://{}/{key}", self.bucket);
                StorageResponse::Success(())
            }
            Err(e) => classify("upload", key, e),
        }
    }

    async fn download(&self, meta: &FileMetadata) -> StorageResponse<Bytes> {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let client = self.build_client();
        let key = &meta.remote_path;

        let resp = match client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return StorageResponse::Failure(format!("remote file not found: {key}"));
                }
                return classify("download", key, e);
            }
        };

        match resp.body.collect().await {
            Ok(aggregated) => {
                let bytes = aggregated.into_bytes();
                debug!(
                    "downloaded {} bytes from s3://{}/{key}",
                    bytes.len(),
                    self.bucket
                );
                StorageResponse::Success(bytes)
            }
            Err(e) => StorageResponse::Failure(format!("failed to read body for {key}: {e}")),
        }
    }

    async fn fetch_remote_metadata(&self, remote_path: &str) -> StorageResponse<RemoteFileHeader> {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let client = self.build_client();

        match client
            .head_object()
            .bucket(&self.bucket)
            .key(remote_path)
            .send()
            .await
        {
            Ok(resp) => {
                let metadata = resp.metadata().cloned().unwrap_or_default();
                let content_length = resp.content_length().unwrap_or(0).max(0) as u64;
                header_from_metadata(
                    remote_path,
                    |name| metadata.get(name).cloned(),
                    content_length,
                )
            }
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return StorageResponse::Failure(format!(
                        "remote file not found: {remote_path}"
                    ));
                }
                classify("fetch remote metadata", remote_path, e)
            }
        }
    }

    async fn create_multipart_upload(&self, meta: &FileMetadata) -> StorageResponse<String> {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let client = self.build_client();
        let key = &meta.remote_path;

        match client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_metadata(Some(object_metadata(meta).into_iter().collect()))
            .send()
            .await
        {
            Ok(resp) => match resp.upload_id() {
                Some(id) => StorageResponse::Success(id.to_string()),
                None => StorageResponse::Failure(format!(
                    "create multipart upload for {key} returned no upload id"
                )),
            },
            Err(e) => classify("create multipart upload", key, e),
        }
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

        let client = self.build_client();
        let key = &meta.remote_path;

        match client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
        {
            Ok(resp) => match resp.e_tag() {
                Some(etag) => StorageResponse::Success(CompletedChunk {
                    part_number,
                    etag: etag.to_string(),
                }),
                None => StorageResponse::Failure(format!(
                    "upload part {part_number} for {key} returned no etag"
                )),
            },
            Err(e) => classify("upload part", key, e),
        }
    }

    async fn complete_multipart_upload(
        &self,
        meta: &FileMetadata,
        upload_id: &str,
        parts: Vec<CompletedChunk>,
    ) -> StorageResponse {
        if self.credentials_expired() {
            return StorageResponse::CredentialExpired;
        }

        let client = self.build_client();
        let key = &meta.remote_path;

        let completed = parts
            .into_iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.etag)
                    .build()
            })
            .collect();

        match client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
        {
            Ok(_) => {
                debug!("completed multipart upload for s3://{}/{key}", self.bucket);
                StorageResponse::Success(())
            }
            Err(e) => classify("complete multipart upload", key, e),
        }
    }
}

/// Maps an SDK error onto the expiry/failure split.
fn classify<T, E>(op: &str, key: &str, err: SdkError<E>) -> StorageResponse<T>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.as_service_error().and_then(|se| se.code());
    if let Some(code) = code {
        if EXPIRY_CODES.contains(&code) {
            debug!("{op} for {key} rejected with stale credentials ({code})");
            return StorageResponse::CredentialExpired;
        }
    }

    StorageResponse::Failure(format!("{op} failed for {key}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_types::StageType;

    #[test]
    fn rejects_non_key_credentials() {
        let stage = StageInfo {
            stage_type: StageType::S3,
            location: "bucket/prefix".into(),
            region: "us-east-1".into(),
            endpoint_override: None,
            credentials: StageCredentials::SharedAccessSignature {
                token: "sig".into(),
                expires_at: None,
            },
        };

        assert!(matches!(
            S3StorageClient::new(&stage),
            Err(StorageError::InvalidStage(_))
        ));
    }

    #[test]
    fn expiry_codes_cover_sts_variants() {
        for code in ["ExpiredToken", "ExpiredTokenException", "InvalidToken"] {
            assert!(EXPIRY_CODES.contains(&code));
        }
        assert!(!EXPIRY_CODES.contains(&"NoSuchKey"));
    }
}
