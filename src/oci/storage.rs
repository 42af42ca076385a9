//! # Block Storage
//!
//! Deletes volume backups created by the tests. [`BlockStorageClient`] talks
//! to the OCI core services REST API directly with signed requests.

use crate::config::Lookup;
use crate::constants::{CORE_API_VERSION, OCI_CONFIG_VAR};
use crate::error::{ScopeError, StorageError};
use crate::oci::config::OciConfig;
use crate::oci::provider::{ConfigurationProvider, Credentials, ProviderSelector};
use crate::oci::signer::{host_header, RequestSigner};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Backup operations the test scope needs
#[async_trait]
pub trait StorageClient: Send + Sync + std::fmt::Debug {
    /// Delete a volume backup. A backup that no longer exists counts as deleted.
    async fn delete_backup(&self, backup_id: &str) -> Result<(), StorageError>;
}

/// Signed REST client for the block storage API
#[derive(Debug)]
pub struct BlockStorageClient {
    http: reqwest::Client,
    signer: RequestSigner,
    endpoint: Url,
}

impl BlockStorageClient {
    /// Client for the provider's region at `https://iaas.<region>.oraclecloud.com`
    pub fn new(provider: &ConfigurationProvider) -> Result<Self, StorageError> {
        let credentials = provider.credentials()?;
        let endpoint = format!("https://iaas.{}.oraclecloud.com", credentials.region);
        Self::from_credentials(&credentials, &endpoint)
    }

    /// Client against an explicit endpoint
    pub fn from_credentials(credentials: &Credentials, endpoint: &str) -> Result<Self, StorageError> {
        let endpoint = Url::parse(endpoint).map_err(|e| StorageError::Endpoint(format!("{endpoint}: {e}")))?;
        let signer = RequestSigner::new(
            credentials.key_id(),
            &credentials.private_key,
            credentials.passphrase.as_deref(),
        )?;

        Ok(Self {
            http: reqwest::Client::new(),
            signer,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn backup_url(&self, backup_id: &str) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend([CORE_API_VERSION, "volumeBackups", backup_id]);
        Ok(url)
    }
}

#[async_trait]
impl StorageClient for BlockStorageClient {
    async fn delete_backup(&self, backup_id: &str) -> Result<(), StorageError> {
        let url = self.backup_url(backup_id)?;
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let authorization = self.signer.authorization("DELETE", &url, &date)?;

        debug!("DELETE {}", url);
        let response = self
            .http
            .delete(url.clone())
            .header(reqwest::header::DATE, &date)
            .header(reqwest::header::HOST, host_header(&url)?)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Deleted volume backup {}", backup_id);
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            info!("Volume backup {} already gone", backup_id);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Status {
            backup_id: backup_id.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Stand-in for a client that could not be built; every call reports why
#[derive(Debug, Clone)]
pub struct DisabledStorageClient {
    reason: String,
}

impl DisabledStorageClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl StorageClient for DisabledStorageClient {
    async fn delete_backup(&self, _backup_id: &str) -> Result<(), StorageError> {
        Err(StorageError::Unusable(self.reason.clone()))
    }
}

/// Builds the storage client of a backup-capable scope during setup
#[async_trait]
pub trait StorageClientFactory: Send + Sync + std::fmt::Debug {
    async fn build(&self) -> Result<Arc<dyn StorageClient>, ScopeError>;
}

/// Factory reading the provisioner's OCI config file
#[derive(Debug)]
pub struct OciStorageClientFactory {
    lookup: Arc<Lookup>,
    selector: ProviderSelector,
    endpoint: Option<String>,
}

impl OciStorageClientFactory {
    pub fn new(lookup: Arc<Lookup>) -> Self {
        Self {
            lookup,
            selector: ProviderSelector::new(),
            endpoint: None,
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: ProviderSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Send requests to `endpoint` instead of the regional endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn client_for(&self, provider: &ConfigurationProvider) -> Result<BlockStorageClient, StorageError> {
        match &self.endpoint {
            Some(endpoint) => BlockStorageClient::from_credentials(&provider.credentials()?, endpoint),
            None => BlockStorageClient::new(provider),
        }
    }
}

#[async_trait]
impl StorageClientFactory for OciStorageClientFactory {
    async fn build(&self) -> Result<Arc<dyn StorageClient>, ScopeError> {
        let path = self.lookup.resolve(OCI_CONFIG_VAR)?;
        let config = OciConfig::load(&path)?;
        let provider = self.selector.select(Some(&config)).await?;

        match self.client_for(&provider) {
            Ok(client) => {
                info!("Block storage client ready at {}", client.endpoint());
                Ok(Arc::new(client))
            }
            Err(e) => {
                error!("Unable to create block storage client: {}", e);
                Ok(Arc::new(DisabledStorageClient::new(e.to_string())))
            }
        }
    }
}
