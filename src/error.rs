//! # Error Types
//!
//! Typed errors for every layer of the framework. Lifecycle steps decide
//! whether an error is fatal, retried, or collected for the teardown report.

use std::time::Duration;
use thiserror::Error;

use crate::provisioner::ProvisionerKind;

/// Errors from the cluster API collaborator
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The named object does not exist (HTTP 404)
    #[error("namespace {0:?} not found")]
    NotFound(String),
    /// The API server could not be reached
    #[error("cluster API unavailable: {0}")]
    Unavailable(String),
    #[error("cluster API request failed: {0}")]
    Api(#[source] kube::Error),
    /// Kubeconfig could not be read or turned into a client
    #[error("failed to build cluster client from {source_desc}: {message}")]
    Client {
        source_desc: String,
        message: String,
    },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}

/// Errors resolving framework configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No resolver in the lookup chain produced a value
    #[error("{0:?} not found in the environment or the test context")]
    Missing(String),
    #[error("failed to open OCI config file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse OCI config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    /// Required credential fields are empty
    #[error("invalid client config: missing {}", .0.join(", "))]
    Invalid(Vec<&'static str>),
    #[error("invalid test context flags: {0}")]
    Flags(#[from] clap::Error),
}

/// Errors selecting or resolving an OCI configuration provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid client config: {0}")]
    InvalidConfig(#[source] ConfigError),
    #[error("InstancePrincipalConfigurationProvider: {0}")]
    InstancePrincipal(String),
    /// Default provider could not find credentials in env or the CLI config
    #[error("default configuration provider: {0}")]
    Default(String),
    #[error("{0}")]
    Unsupported(&'static str),
}

/// Errors from the block storage collaborator
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("failed to resolve credentials: {0}")]
    Credentials(#[from] ProviderError),
    #[error("invalid endpoint {0:?}")]
    Endpoint(String),
    #[error("request signing failed")]
    Signing,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("DeleteVolumeBackup {backup_id} returned {status}: {body}")]
    Status {
        backup_id: String,
        status: u16,
        body: String,
    },
    /// The typed client could not be built; calls report why
    #[error("block storage client is unusable: {0}")]
    Unusable(String),
    #[error("no block storage client configured for this scope")]
    NotConfigured,
}

/// Error returned by a bounded poll
#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("timed out after {elapsed:?} ({attempts} attempts)")]
    Timeout { elapsed: Duration, attempts: u32 },
    /// The condition reported an unrecoverable error
    #[error(transparent)]
    Aborted(E),
}

/// Errors surfaced by the test scope lifecycle
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unable to load volume provisioner configuration: {0}")]
    Provider(#[from] ProviderError),
    #[error("failed to create namespace for {base_name:?}: timed out after {elapsed:?}")]
    NamespaceCreateTimeout { base_name: String, elapsed: Duration },
    #[error("namespace {name} was not deleted within {elapsed:?}")]
    NamespaceDeleteTimeout { name: String, elapsed: Duration },
    #[error("namespace created for {0:?} came back without a name")]
    UnnamedNamespace(String),
    #[error("failed to install {component} provisioner into {namespace}: {source:#}")]
    Install {
        component: ProvisionerKind,
        namespace: String,
        #[source]
        source: anyhow::Error,
    },
}
