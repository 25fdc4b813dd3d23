//! Factory construction and injection-override behavior.

use std::sync::Arc;
use stagehand_storage::mock::InMemoryStorageClient;
use stagehand_storage::{StorageClientFactory, StorageError};
use stagehand_types::{StageCredentials, StageInfo, StageType};

fn stage(stage_type: StageType) -> StageInfo {
    StageInfo {
        stage_type,
        location: "stage-bucket/queries/q-1".into(),
        region: "us-east-1".into(),
        endpoint_override: None,
        credentials: StageCredentials::Keys {
            access_key_id: "AKIATEST".into(),
            secret_access_key: "secret".into(),
            session_token: "token".into(),
            expires_at: None,
        },
    }
}

#[test]
fn builds_s3_client_for_s3_stage() {
    let factory = StorageClientFactory::new();
    assert!(factory.build(&stage(StageType::S3), 4).is_ok());
}

#[test]
fn mock_stage_without_injection_is_a_configuration_error() {
    let factory = StorageClientFactory::new();
    let err = factory.build(&stage(StageType::Mock), 4).unwrap_err();
    assert!(matches!(
        err,
        StorageError::UnsupportedStageType(StageType::Mock)
    ));
}

#[test]
fn blob_stage_without_endpoint_is_a_configuration_error() {
    let mut blob_stage = stage(StageType::Blob);
    blob_stage.credentials = StageCredentials::SharedAccessSignature {
        token: "sv=2024&sig=abc".into(),
        expires_at: None,
    };
    // No endpoint override set.
    let err = factory_build_err(blob_stage);
    assert!(matches!(err, StorageError::InvalidStage(_)));
}

fn factory_build_err(stage: StageInfo) -> StorageError {
    StorageClientFactory::new().build(&stage, 4).unwrap_err()
}

#[test]
fn injected_client_is_returned_for_any_stage() {
    let factory = StorageClientFactory::new();
    let double: Arc<dyn stagehand_storage::StorageClient> =
        Arc::new(InMemoryStorageClient::new());
    factory.inject(double.clone());

    let built = factory.build(&stage(StageType::Mock), 4).unwrap();
    // Same instance, not a fresh construction.
    assert!(Arc::ptr_eq(&built, &double));
}

#[test]
fn injected_client_survives_a_renewal_rebuild() {
    let factory = StorageClientFactory::new();
    let double = Arc::new(InMemoryStorageClient::new());
    factory.inject(double);

    let first = factory.build(&stage(StageType::Mock), 4).unwrap();
    let second = factory.build(&stage(StageType::Mock), 4).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
