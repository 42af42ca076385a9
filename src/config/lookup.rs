//! # Named Value Lookup
//!
//! Resolves framework variables (OCI config path, subnet, mount target, ...)
//! through an ordered chain of resolvers. The standard chain checks the
//! process environment first and falls back to the [`TestContext`] flags.

use super::TestContext;
use crate::constants::{AD, KUBE_CONFIG_VAR, MNT_TARGET_OCID, OCI_CONFIG_VAR, SUBNET_OCID};
use crate::error::ConfigError;
use std::sync::Arc;
use tracing::debug;

/// A single source of named values
pub trait Resolver: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Value for `key`, or `None` if this source does not have it
    fn resolve(&self, key: &str) -> Option<String>;
}

/// Reads the process environment. Empty values count as unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvResolver;

impl Resolver for EnvResolver {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn resolve(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Maps framework variable names onto [`TestContext`] fields
#[derive(Debug, Clone)]
pub struct ContextResolver {
    context: Arc<TestContext>,
}

impl ContextResolver {
    pub fn new(context: Arc<TestContext>) -> Self {
        Self { context }
    }
}

impl Resolver for ContextResolver {
    fn name(&self) -> &'static str {
        "test context"
    }

    fn resolve(&self, key: &str) -> Option<String> {
        let value = match key {
            AD => self.context.ad.as_ref(),
            MNT_TARGET_OCID => self.context.mnt_target_ocid.as_ref(),
            OCI_CONFIG_VAR => self.context.oci_config.as_ref(),
            SUBNET_OCID => self.context.subnet_ocid.as_ref(),
            KUBE_CONFIG_VAR => self.context.kubeconfig.as_ref(),
            _ => None,
        };
        value.filter(|v| !v.is_empty()).cloned()
    }
}

/// Ordered resolver chain; the first resolver with a value wins
#[derive(Debug, Default)]
pub struct Lookup {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl Lookup {
    /// Empty chain; every lookup misses until resolvers are added
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment first, then the test context
    pub fn standard(context: Arc<TestContext>) -> Self {
        Self::new()
            .with(EnvResolver)
            .with(ContextResolver::new(context))
    }

    /// Append a resolver at the end of the chain
    #[must_use]
    pub fn with<R: Resolver + 'static>(mut self, resolver: R) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// First value any resolver has for `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.resolvers.iter().find_map(|resolver| {
            let value = resolver.resolve(key)?;
            debug!(key, source = resolver.name(), "resolved variable");
            Some(value)
        })
    }

    /// Like [`Lookup::get`], but a missing value is a configuration error
    pub fn resolve(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }
}
