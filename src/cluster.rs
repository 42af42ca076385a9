//! # Cluster Client
//!
//! The namespace operations the test scope needs from the Kubernetes API,
//! behind a trait so scopes can run against an in-memory cluster in tests.

use crate::error::ClusterError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::info;

/// Namespace operations against the cluster under test
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a namespace; the returned object carries the server-assigned name
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError>;

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError>;

    /// Request deletion; the namespace may linger while it terminates
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;
}

/// [`ClusterClient`] backed by kube-rs
#[derive(Clone)]
pub struct KubeClusterClient {
    namespaces: Api<Namespace>,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self {
            namespaces: Api::all(client),
        }
    }

    /// Build a client from a kubeconfig file, or from the default inference
    /// chain (in-cluster config, `KUBECONFIG`, `~/.kube/config`) when no path
    /// is given.
    pub async fn from_kubeconfig(path: Option<&Path>) -> Result<Self, ClusterError> {
        let Some(path) = path else {
            info!("Creating a kubernetes client from the default configuration");
            let client = Client::try_default()
                .await
                .map_err(|e| ClusterError::Client {
                    source_desc: "default kubeconfig".to_string(),
                    message: e.to_string(),
                })?;
            return Ok(Self::new(client));
        };

        info!("Creating a kubernetes client from {}", path.display());
        let client_error = |message: String| ClusterError::Client {
            source_desc: path.display().to_string(),
            message,
        };

        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| client_error(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| client_error(e.to_string()))?;
        let client = Client::try_from(config).map_err(|e| client_error(e.to_string()))?;

        Ok(Self::new(client))
    }
}

/// Classify a kube error so "not found" and connectivity issues are distinguishable
fn classify(error: kube::Error, name: &str) -> ClusterError {
    match error {
        kube::Error::Api(ref status) if status.code == 404 => {
            ClusterError::NotFound(name.to_string())
        }
        kube::Error::HyperError(e) => ClusterError::Unavailable(e.to_string()),
        kube::Error::Service(e) => ClusterError::Unavailable(e.to_string()),
        other => ClusterError::Api(other),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        let name = namespace
            .metadata
            .name
            .as_deref()
            .or(namespace.metadata.generate_name.as_deref())
            .unwrap_or_default();
        self.namespaces
            .create(&PostParams::default(), namespace)
            .await
            .map_err(|e| classify(e, name))
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        self.namespaces.get(name).await.map_err(|e| classify(e, name))
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.namespaces
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, name))
    }
}
