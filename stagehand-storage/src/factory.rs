//! Storage client construction.

use crate::blob::BlobStorageClient;
use crate::client::StorageClient;
use crate::error::{StorageError, StorageResult};
use crate::s3::S3StorageClient;
use std::sync::{Arc, Mutex};
use stagehand_types::{StageInfo, StageType};
use tracing::debug;

/// Builds storage clients bound to a stage snapshot.
///
/// The factory is owned by the transfer agent and passed in explicitly, so
/// test wiring never touches process-wide state. `inject` installs a
/// client double that `build` returns instead of constructing a real
/// provider client; the override persists across builds, so the renewal
/// rebuild observes the same double.
#[derive(Default)]
pub struct StorageClientFactory {
    injected: Mutex<Option<Arc<dyn StorageClient>>>,
}

impl StorageClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a client double returned by subsequent `build` calls.
    /// Test-only wiring; the production path never calls this.
    pub fn inject(&self, client: Arc<dyn StorageClient>) {
        let mut slot = self.injected.lock().expect("injection slot poisoned");
        *slot = Some(client);
    }

    /// Builds (or returns the injected) client for the stage's provider.
    ///
    /// An unsupported provider tag is a fatal configuration error — there
    /// is nothing a retry could change.
    pub fn build(
        &self,
        stage: &StageInfo,
        parallel: usize,
    ) -> StorageResult<Arc<dyn StorageClient>> {
        if let Some(client) = self.injected.lock().expect("injection slot poisoned").as_ref() {
            debug!("returning injected storage client for {} stage", stage.stage_type);
            return Ok(Arc::clone(client));
        }

        match stage.stage_type {
            StageType::S3 => {
                debug!(
                    "building s3 storage client for {} (parallel={parallel})",
                    stage.location
                );
                Ok(Arc::new(S3StorageClient::new(stage)?))
            }
            StageType::Blob => {
                debug!(
                    "building blob storage client for {} (parallel={parallel})",
                    stage.location
                );
                Ok(Arc::new(BlobStorageClient::new(stage, parallel)?))
            }
            StageType::Mock => Err(StorageError::UnsupportedStageType(StageType::Mock)),
        }
    }
}
