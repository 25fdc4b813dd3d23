//! Storage provider clients for the Stagehand transfer engine.
//!
//! Provides the polymorphic [`StorageClient`] trait with:
//! - S3 implementation (AWS SDK, S3-compatible endpoints)
//! - SAS-token block blob implementation (plain HTTPS)
//! - In-memory test double with programmable credential expiry
//! - [`StorageClientFactory`] that binds a client to a stage snapshot,
//!   with an explicit injection slot for test doubles
//!
//! Every operation reports credential expiry as a value
//! ([`StorageResponse::CredentialExpired`]), never as an error: the
//! transfer agent treats it as a recoverable outcome and drives the
//! renewal cycle.

pub mod blob;
pub mod client;
pub mod error;
pub mod factory;
pub mod mock;
pub mod s3;

pub use client::{
    CompletedChunk, RemoteFileHeader, StorageClient, StorageResponse, META_NONCE,
    META_PLAIN_DIGEST, META_PLAIN_SIZE, META_WRAPPED_KEY,
};
pub use error::{StorageError, StorageResult};
pub use factory::StorageClientFactory;
