//! # OCI
//!
//! Client configuration, authentication and the block storage client used to
//! clean up volume backups.

pub mod config;
pub mod provider;
pub mod signer;
pub mod storage;

pub use config::{AuthConfig, OciConfig};
pub use provider::{ConfigurationProvider, Credentials, ProviderKind, ProviderSelector};
pub use storage::{
    BlockStorageClient, DisabledStorageClient, OciStorageClientFactory, StorageClient,
    StorageClientFactory,
};
