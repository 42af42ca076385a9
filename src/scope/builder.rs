//! Construction of [`TestScope`]s. Building never performs I/O.

use super::{ScopeInner, ScopeState, TestScope};
use crate::cleanup::CleanupRegistry;
use crate::cluster::ClusterClient;
use crate::config::{Lookup, TestContext};
use crate::oci::storage::{OciStorageClientFactory, StorageClientFactory};
use crate::poll::PollPolicy;
use crate::provisioner::ProvisionerInstaller;
use std::sync::{Arc, Mutex};

/// Builder for [`TestScope`]
pub struct TestScopeBuilder {
    base_name: String,
    installer: Arc<dyn ProvisionerInstaller>,
    cluster: Option<Arc<dyn ClusterClient>>,
    backup: bool,
    storage_factory: Option<Arc<dyn StorageClientFactory>>,
    registry: Option<CleanupRegistry>,
    context: Option<Arc<TestContext>>,
    lookup: Option<Arc<Lookup>>,
    poll: PollPolicy,
}

impl std::fmt::Debug for TestScopeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestScopeBuilder")
            .field("base_name", &self.base_name)
            .field("backup", &self.backup)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl TestScopeBuilder {
    pub(super) fn new(base_name: impl Into<String>, installer: Arc<dyn ProvisionerInstaller>) -> Self {
        Self {
            base_name: base_name.into(),
            installer,
            cluster: None,
            backup: false,
            storage_factory: None,
            registry: None,
            context: None,
            lookup: None,
            poll: PollPolicy::default(),
        }
    }

    /// Use this cluster client instead of building one from a kubeconfig at setup
    #[must_use]
    pub fn cluster_client(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Build a block storage client at every setup so tests can delete backups
    #[must_use]
    pub fn backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Storage client factory for backup-capable scopes.
    ///
    /// Defaults to [`OciStorageClientFactory`] over the scope's lookup chain.
    #[must_use]
    pub fn storage_factory(mut self, factory: Arc<dyn StorageClientFactory>) -> Self {
        self.storage_factory = Some(factory);
        self
    }

    /// Registry the teardown is registered with (default: the process registry)
    #[must_use]
    pub fn registry(mut self, registry: CleanupRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn context(mut self, context: Arc<TestContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Lookup chain for named values (default: environment, then the context)
    #[must_use]
    pub fn lookup(mut self, lookup: Arc<Lookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    #[must_use]
    pub fn poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn build(self) -> TestScope {
        let context = self.context.unwrap_or_default();
        let lookup = self
            .lookup
            .unwrap_or_else(|| Arc::new(Lookup::standard(Arc::clone(&context))));

        let storage_factory = if self.backup {
            Some(self.storage_factory.unwrap_or_else(|| {
                Arc::new(OciStorageClientFactory::new(Arc::clone(&lookup)))
            }))
        } else {
            None
        };

        let cluster = tokio::sync::OnceCell::new_with(self.cluster);

        TestScope {
            inner: Arc::new(ScopeInner {
                base_name: self.base_name,
                backup_capable: self.backup,
                installer: self.installer,
                storage_factory,
                registry: self.registry.unwrap_or_else(CleanupRegistry::process),
                context,
                lookup,
                poll: self.poll,
                cluster,
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }
}
