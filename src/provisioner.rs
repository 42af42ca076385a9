//! # Provisioner Installation
//!
//! Installs the block-volume and file-share provisioner components into a
//! test namespace.
//!
//! [`ManifestInstaller`] applies the provisioner's YAML manifests with
//! server-side apply. Namespaced objects are moved into the target namespace;
//! cluster-scoped objects (RBAC, storage classes) are applied as-is.

use crate::constants::FIELD_MANAGER;
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, Scope};
use kube::{Client, ResourceExt};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Which provisioner component is being installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionerKind {
    FileShare,
    Block,
}

impl std::fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionerKind::FileShare => write!(f, "file-share"),
            ProvisionerKind::Block => write!(f, "block"),
        }
    }
}

/// Installs provisioner components into a namespace
#[async_trait]
pub trait ProvisionerInstaller: Send + Sync {
    async fn install_file_share_provisioner(&self, namespace: &str) -> Result<()>;

    async fn install_block_provisioner(&self, namespace: &str) -> Result<()>;
}

/// Manifest locations for both provisioner components
#[derive(Debug, Clone)]
pub struct ProvisionerManifests {
    pub file_share: PathBuf,
    pub block: PathBuf,
}

/// [`ProvisionerInstaller`] that server-side applies YAML manifests
#[derive(Clone)]
pub struct ManifestInstaller {
    client: Client,
    manifests: ProvisionerManifests,
}

impl std::fmt::Debug for ManifestInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestInstaller")
            .field("manifests", &self.manifests)
            .finish_non_exhaustive()
    }
}

impl ManifestInstaller {
    pub fn new(client: Client, manifests: ProvisionerManifests) -> Self {
        Self { client, manifests }
    }

    async fn install(&self, kind: ProvisionerKind, namespace: &str) -> Result<()> {
        let path = match kind {
            ProvisionerKind::FileShare => &self.manifests.file_share,
            ProvisionerKind::Block => &self.manifests.block,
        };
        info!("Installing {} provisioner into {} from {}", kind, namespace, path.display());

        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {} provisioner manifest {}", kind, path.display()))?;
        let objects = parse_manifests(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        for object in objects {
            self.apply(object, namespace).await?;
        }

        info!("{} provisioner installed into {}", kind, namespace);
        Ok(())
    }

    async fn apply(&self, mut object: DynamicObject, namespace: &str) -> Result<()> {
        let name = object.name_any();
        let types = object
            .types
            .as_ref()
            .with_context(|| format!("Manifest object {name} has no apiVersion/kind"))?;
        let gvk = GroupVersionKind::try_from(types)
            .with_context(|| format!("Manifest object {name} has an invalid apiVersion"))?;

        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .with_context(|| format!("Kind {} is not served by the cluster", gvk.kind))?;

        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            object.metadata.namespace = Some(namespace.to_string());
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(&object))
            .await
            .with_context(|| format!("Failed to apply {} {}", gvk.kind, name))?;
        debug!("Applied {} {}", gvk.kind, name);

        Ok(())
    }
}

#[async_trait]
impl ProvisionerInstaller for ManifestInstaller {
    async fn install_file_share_provisioner(&self, namespace: &str) -> Result<()> {
        self.install(ProvisionerKind::FileShare, namespace).await
    }

    async fn install_block_provisioner(&self, namespace: &str) -> Result<()> {
        self.install(ProvisionerKind::Block, namespace).await
    }
}

/// Split a multi-document YAML manifest into objects, skipping empty documents
pub fn parse_manifests(text: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("Invalid YAML in document {index}"))?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject = serde_yaml::from_value(value)
            .with_context(|| format!("Document {index} is not a Kubernetes object"))?;
        if object.metadata.name.is_none() {
            anyhow::bail!("Document {index} has no metadata.name");
        }
        objects.push(object);
    }
    Ok(objects)
}
