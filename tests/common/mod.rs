//! In-memory collaborators for scope tests.

#![allow(dead_code, reason = "Each test binary uses a different subset of the fakes")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use volume_provisioner_e2e::cleanup::CleanupRegistry;
use volume_provisioner_e2e::cluster::ClusterClient;
use volume_provisioner_e2e::config::TestContext;
use volume_provisioner_e2e::error::{ClusterError, ScopeError, StorageError};
use volume_provisioner_e2e::oci::storage::{StorageClient, StorageClientFactory};
use volume_provisioner_e2e::poll::PollPolicy;
use volume_provisioner_e2e::provisioner::ProvisionerInstaller;
use volume_provisioner_e2e::scope::TestScope;

#[derive(Debug, Default)]
struct ClusterState {
    namespaces: BTreeMap<String, Namespace>,
    next_suffix: u32,
    failing_creates: u32,
    always_fail_creates: bool,
    failing_gets: u32,
    reject_deletes: bool,
    /// Deleted but never finish terminating
    stuck: HashSet<String>,
    create_calls: u32,
    get_calls: u32,
    delete_calls: Vec<String>,
}

/// Cluster whose namespaces live in a map
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` create calls with a connectivity error
    pub fn fail_creates(&self, count: u32) {
        self.state.lock().unwrap().failing_creates = count;
    }

    pub fn fail_all_creates(&self) {
        self.state.lock().unwrap().always_fail_creates = true;
    }

    /// Fail the next `count` get calls with a connectivity error
    pub fn fail_gets(&self, count: u32) {
        self.state.lock().unwrap().failing_gets = count;
    }

    /// Reject every delete with an error other than not found
    pub fn reject_deletes(&self) {
        self.state.lock().unwrap().reject_deletes = true;
    }

    /// Deleting `name` is accepted but it never disappears
    pub fn never_finish_deleting(&self, name: &str) {
        self.state.lock().unwrap().stuck.insert(name.to_string());
    }

    pub fn insert_existing(&self, name: &str) {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        self.state
            .lock()
            .unwrap()
            .namespaces
            .insert(name.to_string(), namespace);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().unwrap().namespaces.contains_key(name)
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state.lock().unwrap().namespaces.get(name).cloned()
    }

    pub fn create_calls(&self) -> u32 {
        self.state.lock().unwrap().create_calls
    }

    pub fn get_calls(&self) -> u32 {
        self.state.lock().unwrap().get_calls
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().delete_calls.clone()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;

        if state.always_fail_creates {
            return Err(ClusterError::Unavailable("connection refused".to_string()));
        }
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(ClusterError::Unavailable("connection refused".to_string()));
        }

        state.next_suffix += 1;
        let prefix = namespace.metadata.generate_name.clone().unwrap_or_default();
        let name = format!("{prefix}{:05}", state.next_suffix);

        let mut created = namespace.clone();
        created.metadata.name = Some(name.clone());
        created.metadata.generate_name = None;
        state.namespaces.insert(name, created.clone());
        Ok(created)
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.get_calls += 1;
        if state.failing_gets > 0 {
            state.failing_gets -= 1;
            return Err(ClusterError::Unavailable("connection reset by peer".to_string()));
        }
        state
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls.push(name.to_string());
        if state.reject_deletes {
            return Err(ClusterError::Unavailable("admission webhook denied the request".to_string()));
        }
        if !state.namespaces.contains_key(name) {
            return Err(ClusterError::NotFound(name.to_string()));
        }
        if !state.stuck.contains(name) {
            state.namespaces.remove(name);
        }
        Ok(())
    }
}

/// Records installs per component
#[derive(Debug, Default)]
pub struct FakeInstaller {
    file_share: Mutex<Vec<String>>,
    block: Mutex<Vec<String>>,
    fail_block: Mutex<bool>,
}

impl FakeInstaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_block_installs(&self, fail: bool) {
        *self.fail_block.lock().unwrap() = fail;
    }

    pub fn file_share_installs(&self) -> Vec<String> {
        self.file_share.lock().unwrap().clone()
    }

    pub fn block_installs(&self) -> Vec<String> {
        self.block.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProvisionerInstaller for FakeInstaller {
    async fn install_file_share_provisioner(&self, namespace: &str) -> anyhow::Result<()> {
        self.file_share.lock().unwrap().push(namespace.to_string());
        Ok(())
    }

    async fn install_block_provisioner(&self, namespace: &str) -> anyhow::Result<()> {
        if *self.fail_block.lock().unwrap() {
            anyhow::bail!("deployment oci-block-volume-provisioner rejected");
        }
        self.block.lock().unwrap().push(namespace.to_string());
        Ok(())
    }
}

/// Storage client that fails deletions of selected backups
#[derive(Debug, Default)]
pub struct FakeStorage {
    failing: HashSet<String>,
    attempts: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn failing(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: ids.iter().map(ToString::to_string).collect(),
            attempts: Mutex::default(),
        })
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn delete_backup(&self, backup_id: &str) -> Result<(), StorageError> {
        self.attempts.lock().unwrap().push(backup_id.to_string());
        if self.failing.contains(backup_id) {
            return Err(StorageError::Status {
                backup_id: backup_id.to_string(),
                status: 409,
                body: "backup is in use".to_string(),
            });
        }
        Ok(())
    }
}

/// Hands out a shared [`FakeStorage`], or fails every build
#[derive(Debug)]
pub struct FakeStorageFactory {
    storage: Option<Arc<FakeStorage>>,
    builds: Mutex<u32>,
}

impl FakeStorageFactory {
    pub fn new(storage: Arc<FakeStorage>) -> Arc<Self> {
        Arc::new(Self {
            storage: Some(storage),
            builds: Mutex::new(0),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            storage: None,
            builds: Mutex::new(0),
        })
    }

    pub fn builds(&self) -> u32 {
        *self.builds.lock().unwrap()
    }
}

#[async_trait]
impl StorageClientFactory for FakeStorageFactory {
    async fn build(&self) -> Result<Arc<dyn StorageClient>, ScopeError> {
        *self.builds.lock().unwrap() += 1;
        match &self.storage {
            Some(storage) => Ok(Arc::clone(storage) as Arc<dyn StorageClient>),
            None => Err(ScopeError::Config(
                volume_provisioner_e2e::error::ConfigError::Missing("OCICONFIG_VAR".to_string()),
            )),
        }
    }
}

/// Test context with the given deletion flags
pub fn context(delete_namespace: bool, delete_namespace_on_failure: bool) -> Arc<TestContext> {
    Arc::new(TestContext {
        delete_namespace,
        delete_namespace_on_failure,
        ..TestContext::default()
    })
}

/// Two second polls, thirty second creates, one minute deletes
pub fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(2),
        create_timeout: Duration::from_secs(30),
        delete_timeout: Duration::from_secs(60),
    }
}

/// Everything a scope test needs to inspect afterwards
pub struct Fixture {
    pub scope: TestScope,
    pub cluster: Arc<FakeCluster>,
    pub installer: Arc<FakeInstaller>,
    pub registry: CleanupRegistry,
}

/// Scope wired to fakes and a private cleanup registry
pub fn fixture(name: &str, context: Arc<TestContext>) -> Fixture {
    let cluster = FakeCluster::new();
    let installer = FakeInstaller::new();
    let registry = CleanupRegistry::new();

    let scope = TestScope::builder(name, Arc::clone(&installer) as Arc<dyn ProvisionerInstaller>)
        .cluster_client(Arc::clone(&cluster) as Arc<dyn ClusterClient>)
        .registry(registry.clone())
        .context(context)
        .poll_policy(fast_policy())
        .build();

    Fixture {
        scope,
        cluster,
        installer,
        registry,
    }
}
