//! # Test Scope
//!
//! Per-suite lifecycle controller. A [`TestScope`] lives for a whole suite and
//! runs one setup/teardown cycle per test:
//!
//! - **setup** registers the teardown with the cleanup registry, connects to
//!   the cluster, creates (or fetches) the test namespace, builds the block
//!   storage client for backup-capable scopes, and installs the provisioners
//! - **teardown** removes the registration, deletes the tracked namespaces
//!   (subject to the deletion policy) and the tracked backups, and resets the
//!   provisioner flags
//!
//! Construction is cheap; all I/O happens in setup and teardown. If the suite
//! aborts between the two, running the cleanup registry performs the teardown
//! as if the test had failed.

mod builder;
mod report;

pub use builder::TestScopeBuilder;
pub use report::TeardownReport;

use crate::cleanup::{CleanupHandle, CleanupRegistry};
use crate::cluster::{ClusterClient, KubeClusterClient};
use crate::config::{Lookup, TestContext};
use crate::constants::{KUBE_CONFIG_VAR, NAMESPACE_NAME_PREFIX, SCOPE_LABEL};
use crate::error::{ClusterError, PollError, ScopeError, StorageError};
use crate::oci::storage::{StorageClient, StorageClientFactory};
use crate::poll::{poll_immediate, PollPolicy};
use crate::provisioner::{ProvisionerInstaller, ProvisionerKind};
use futures::FutureExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle controller for the tests of one suite. Cloning shares the scope.
#[derive(Clone)]
pub struct TestScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    base_name: String,
    backup_capable: bool,
    installer: Arc<dyn ProvisionerInstaller>,
    storage_factory: Option<Arc<dyn StorageClientFactory>>,
    registry: CleanupRegistry,
    context: Arc<TestContext>,
    lookup: Arc<Lookup>,
    poll: PollPolicy,
    cluster: tokio::sync::OnceCell<Arc<dyn ClusterClient>>,
    state: Mutex<ScopeState>,
}

/// Per-cycle state. Never locked across an `.await`.
#[derive(Default)]
struct ScopeState {
    primary_namespace: Option<String>,
    namespaces: Vec<String>,
    backups: Vec<String>,
    storage_client: Option<Arc<dyn StorageClient>>,
    file_share_installed: bool,
    block_installed: bool,
    cleanup_handle: Option<CleanupHandle>,
}

impl std::fmt::Debug for TestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("TestScope")
            .field("base_name", &self.inner.base_name)
            .field("backup_capable", &self.inner.backup_capable)
            .field("primary_namespace", &state.primary_namespace)
            .field("namespaces", &state.namespaces)
            .field("backups", &state.backups)
            .finish_non_exhaustive()
    }
}

impl TestScope {
    /// Builder for scopes that need non-default collaborators
    pub fn builder(
        base_name: impl Into<String>,
        installer: Arc<dyn ProvisionerInstaller>,
    ) -> TestScopeBuilder {
        TestScopeBuilder::new(base_name, installer)
    }

    /// Scope without backup support, using the given suite context
    pub fn new(
        base_name: impl Into<String>,
        installer: Arc<dyn ProvisionerInstaller>,
        context: Arc<TestContext>,
    ) -> Self {
        Self::builder(base_name, installer).context(context).build()
    }

    /// Backup-capable scope: setup also builds a block storage client
    pub fn new_backup(
        base_name: impl Into<String>,
        installer: Arc<dyn ProvisionerInstaller>,
        context: Arc<TestContext>,
    ) -> Self {
        Self::builder(base_name, installer)
            .context(context)
            .backup(true)
            .build()
    }

    fn state(&self) -> MutexGuard<'_, ScopeState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name that namespaces of this scope are derived from
    pub fn base_name(&self) -> &str {
        &self.inner.base_name
    }

    /// Whether setup builds a block storage client
    pub fn is_backup_capable(&self) -> bool {
        self.inner.backup_capable
    }

    /// Suite-wide flags the scope was built with
    pub fn context(&self) -> &TestContext {
        &self.inner.context
    }

    /// Environment-then-context lookup for configuration values
    pub fn lookup(&self) -> &Lookup {
        &self.inner.lookup
    }

    /// Namespace the current test runs in; `None` outside a setup/teardown cycle
    pub fn primary_namespace(&self) -> Option<String> {
        self.state().primary_namespace.clone()
    }

    /// Namespaces that teardown may delete, in creation order
    pub fn namespaces(&self) -> Vec<String> {
        self.state().namespaces.clone()
    }

    /// Backups that teardown will delete, in tracking order
    pub fn backups(&self) -> Vec<String> {
        self.state().backups.clone()
    }

    /// Block storage client; only set between a successful setup of a
    /// backup-capable scope and the next teardown
    pub fn storage_client(&self) -> Option<Arc<dyn StorageClient>> {
        self.state().storage_client.clone()
    }

    /// Whether the file share provisioner was installed this cycle
    pub fn file_share_provisioner_installed(&self) -> bool {
        self.state().file_share_installed
    }

    /// Whether the block volume provisioner was installed this cycle
    pub fn block_provisioner_installed(&self) -> bool {
        self.state().block_installed
    }

    /// Whether a teardown is currently registered with the cleanup registry
    pub fn cleanup_registered(&self) -> bool {
        self.state().cleanup_handle.is_some()
    }

    /// Record a backup for deletion at teardown
    pub fn track_backup(&self, backup_id: impl Into<String>) {
        let backup_id = backup_id.into();
        debug!(scope = %self.inner.base_name, backup_id = %backup_id, "tracking backup");
        self.state().backups.push(backup_id);
    }

    /// Prepare the scope for the next test
    pub async fn setup(&self) -> Result<(), ScopeError> {
        info!(scope = %self.inner.base_name, "Setting up test scope");
        self.register_cleanup();

        let cluster = self.cluster().await?;

        let namespace = match self.inner.context.existing_namespace() {
            Some(name) => {
                info!("Getting existing namespace {:?}", name);
                let namespace = cluster.get_namespace(name).await?;
                let name = namespace
                    .metadata
                    .name
                    .ok_or_else(|| ScopeError::UnnamedNamespace(name.to_string()))?;
                // Fetched namespaces are never deleted by the scope
                self.state().primary_namespace = Some(name.clone());
                name
            }
            None => {
                info!("Building a namespace api object");
                let base_name = self.inner.base_name.clone();
                let name = self.create_namespace(&base_name, BTreeMap::new()).await?;
                self.state().primary_namespace = Some(name.clone());
                name
            }
        };

        let storage_client = match &self.inner.storage_factory {
            Some(factory) => {
                info!("Creating an OCI block storage client");
                Some(factory.build().await?)
            }
            None => None,
        };

        if !self.file_share_provisioner_installed() {
            self.inner
                .installer
                .install_file_share_provisioner(&namespace)
                .await
                .map_err(|source| ScopeError::Install {
                    component: ProvisionerKind::FileShare,
                    namespace: namespace.clone(),
                    source,
                })?;
            self.state().file_share_installed = true;
        }

        if !self.block_provisioner_installed() {
            self.inner
                .installer
                .install_block_provisioner(&namespace)
                .await
                .map_err(|source| ScopeError::Install {
                    component: ProvisionerKind::Block,
                    namespace: namespace.clone(),
                    source,
                })?;
            self.state().block_installed = true;
        }

        self.state().storage_client = storage_client;
        info!(scope = %self.inner.base_name, namespace = %namespace, "Test scope ready");
        Ok(())
    }

    fn register_cleanup(&self) {
        let scope = self.clone();
        let handle = self.inner.registry.register(move || {
            async move {
                let report = scope.teardown(true).await;
                if let Some(failure) = report.failure() {
                    error!(scope = %scope.inner.base_name, "Cleanup failed: {}", failure);
                }
            }
            .boxed()
        });

        let previous = self.state().cleanup_handle.replace(handle);
        if let Some(previous) = previous {
            self.inner.registry.remove(&previous);
        }
    }

    async fn cluster(&self) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        let cluster = self
            .inner
            .cluster
            .get_or_try_init(|| async {
                info!("Creating a kubernetes client");
                let path = self.inner.lookup.get(KUBE_CONFIG_VAR).map(PathBuf::from);
                let client = KubeClusterClient::from_kubeconfig(path.as_deref()).await?;
                Ok::<Arc<dyn ClusterClient>, ClusterError>(Arc::new(client))
            })
            .await?;
        Ok(Arc::clone(cluster))
    }

    /// Create a namespace named `volume-provisioner-e2e-tests-<base_name>-<random>`
    /// labelled with the scope, retrying until the create timeout.
    ///
    /// The namespace is tracked for deletion at teardown, and becomes the
    /// primary namespace if the cycle has none yet.
    pub async fn create_namespace(
        &self,
        base_name: &str,
        mut labels: BTreeMap<String, String>,
    ) -> Result<String, ScopeError> {
        let cluster = self.cluster().await?;
        labels.insert(SCOPE_LABEL.to_string(), base_name.to_string());

        let namespace = Namespace {
            metadata: ObjectMeta {
                generate_name: Some(format!("{NAMESPACE_NAME_PREFIX}-{base_name}-")),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };

        let poll = self.inner.poll;
        let (cluster, namespace) = (&cluster, &namespace);
        let created = poll_immediate(poll.interval, poll.create_timeout, || async move {
            match cluster.create_namespace(namespace).await {
                Ok(created) => Ok::<_, Infallible>(Some(created)),
                Err(e) => {
                    warn!("Unexpected error while creating namespace: {}", e);
                    Ok(None)
                }
            }
        })
        .await
        .map_err(|e| match e {
            PollError::Timeout { elapsed, attempts } => {
                error!(base_name, attempts, "Namespace creation timed out after {:?}", elapsed);
                ScopeError::NamespaceCreateTimeout {
                    base_name: base_name.to_string(),
                    elapsed,
                }
            }
            PollError::Aborted(never) => match never {},
        })?;

        let name = created
            .metadata
            .name
            .ok_or_else(|| ScopeError::UnnamedNamespace(base_name.to_string()))?;
        info!("Created test namespace {}", name);

        let mut state = self.state();
        state.namespaces.push(name.clone());
        if state.primary_namespace.is_none() {
            state.primary_namespace = Some(name.clone());
        }
        Ok(name)
    }

    /// Delete a namespace and wait until it is gone.
    ///
    /// A namespace that does not exist counts as deleted.
    pub async fn delete_namespace(&self, name: &str, timeout: Duration) -> Result<(), ScopeError> {
        let cluster = self.cluster().await?;
        let start = Instant::now();

        match cluster.delete_namespace(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("Namespace {} already deleted", name);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let cluster = &cluster;
        poll_immediate(self.inner.poll.interval, timeout, || async move {
            match cluster.get_namespace(name).await {
                Err(e) if e.is_not_found() => Ok::<_, Infallible>(Some(())),
                Err(e) => {
                    warn!("Error while waiting for namespace to be terminated: {}", e);
                    Ok(None)
                }
                Ok(_) => Ok(None),
            }
        })
        .await
        .map_err(|e| match e {
            PollError::Timeout { elapsed, .. } => ScopeError::NamespaceDeleteTimeout {
                name: name.to_string(),
                elapsed,
            },
            PollError::Aborted(never) => match never {},
        })?;

        info!("Namespace {} deletion completed in {:?}", name, start.elapsed());
        Ok(())
    }

    /// Clean up after a test.
    ///
    /// Never aborts early: every tracked namespace and backup is attempted and
    /// failures are collected in the report.
    pub async fn teardown(&self, test_failed: bool) -> TeardownReport {
        let (handle, namespaces, backups, storage_client) = {
            let mut state = self.state();
            state.primary_namespace = None;
            (
                state.cleanup_handle.take(),
                std::mem::take(&mut state.namespaces),
                std::mem::take(&mut state.backups),
                state.storage_client.take(),
            )
        };
        if let Some(handle) = handle {
            self.inner.registry.remove(&handle);
        }
        info!(scope = %self.inner.base_name, test_failed, "Tearing down test scope");

        let mut report = TeardownReport::default();

        if self.inner.context.namespace_policy().should_delete(test_failed) {
            for namespace in namespaces {
                info!("Destroying namespace {:?} for this suite", namespace);
                match self.delete_namespace(&namespace, self.inner.poll.delete_timeout).await {
                    Ok(()) => report.namespaces_deleted.push(namespace),
                    Err(e) => {
                        error!("Couldn't delete namespace {}: {}", namespace, e);
                        report.namespace_errors.push((namespace, e));
                    }
                }
            }
        } else {
            for namespace in &namespaces {
                warn!("Preserving namespace {} for inspection", namespace);
            }
            report.namespaces_preserved = namespaces;
        }

        for backup_id in backups {
            info!("Deleting backup {:?}", backup_id);
            let result = match &storage_client {
                Some(client) => client.delete_backup(&backup_id).await,
                None => Err(StorageError::NotConfigured),
            };
            match result {
                Ok(()) => report.backups_deleted.push(backup_id),
                Err(e) => {
                    error!("Failed to delete backup {}: {}", backup_id, e);
                    report.backup_errors.push((backup_id, e));
                }
            }
        }

        {
            let mut state = self.state();
            state.file_share_installed = false;
            state.block_installed = false;
        }

        report
    }
}
