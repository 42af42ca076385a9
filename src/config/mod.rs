//! # Test Context Configuration
//!
//! Suite-wide settings loaded from command-line flags, with `E2E_*`
//! environment variables as fallbacks for the ones a CI job usually sets.
//!
//! Values that the framework looks up by name (OCI config path, subnet, ...)
//! are resolved through [`lookup::Lookup`], which consults the process
//! environment before this context.

pub mod lookup;

pub use lookup::{ContextResolver, EnvResolver, Lookup, Resolver};

use crate::error::ConfigError;
use clap::{ArgAction, Parser};

/// Suite-wide test context
#[derive(Debug, Clone, Parser)]
#[command(name = "volume-provisioner-e2e", about = "OCI volume provisioner e2e suite settings")]
pub struct TestContext {
    /// Kubeconfig for the cluster under test (kube default inference when unset)
    #[arg(long, env = "E2E_KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Run every test in this existing namespace instead of creating one
    #[arg(long, env = "E2E_NAMESPACE")]
    pub namespace: Option<String>,

    /// Delete test namespaces after each test
    #[arg(long, env = "E2E_DELETE_NAMESPACE", default_value_t = true, action = ArgAction::Set)]
    pub delete_namespace: bool,

    /// Also delete namespaces of failed tests (otherwise they are kept for debugging)
    #[arg(
        long,
        env = "E2E_DELETE_NAMESPACE_ON_FAILURE",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub delete_namespace_on_failure: bool,

    /// OCI auth config file for the block storage client
    #[arg(long)]
    pub oci_config: Option<String>,

    /// Subnet OCID for file-share storage classes
    #[arg(long)]
    pub subnet_ocid: Option<String>,

    /// Mount target OCID for file-share storage classes
    #[arg(long)]
    pub mnt_target_ocid: Option<String>,

    /// Availability domain
    #[arg(long)]
    pub ad: Option<String>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            namespace: None,
            delete_namespace: true,
            delete_namespace_on_failure: true,
            oci_config: None,
            subnet_ocid: None,
            mnt_target_ocid: None,
            ad: None,
        }
    }
}

impl TestContext {
    /// Load the context from `E2E_*` environment variables only.
    ///
    /// Test binaries own their argv (libtest flags), so suites normally use this.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::try_parse_from(["volume-provisioner-e2e"])?)
    }

    /// Load the context from explicit flags (environment fallbacks still apply)
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let args = std::iter::once(std::ffi::OsString::from("volume-provisioner-e2e"))
            .chain(args.into_iter().map(Into::into));
        Ok(Self::try_parse_from(args)?)
    }

    /// Namespace preservation policy derived from the delete flags
    pub fn namespace_policy(&self) -> NamespacePolicy {
        NamespacePolicy {
            delete_namespaces: self.delete_namespace,
            delete_on_failure: self.delete_namespace_on_failure,
        }
    }

    /// Existing namespace to reuse, ignoring an empty flag
    pub fn existing_namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

/// Decides whether a finished test's namespaces are deleted or kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespacePolicy {
    /// When false, namespaces are always preserved
    pub delete_namespaces: bool,
    /// When false, namespaces of failed tests are preserved for debugging
    pub delete_on_failure: bool,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self {
            delete_namespaces: true,
            delete_on_failure: true,
        }
    }
}

impl NamespacePolicy {
    pub fn should_delete(&self, test_failed: bool) -> bool {
        self.delete_namespaces && (self.delete_on_failure || !test_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_matrix() {
        let cases = [
            // (delete, on_failure, failed, expected)
            (true, true, false, true),
            (true, true, true, true),
            (true, false, false, true),
            (true, false, true, false),
            (false, true, false, false),
            (false, true, true, false),
            (false, false, false, false),
            (false, false, true, false),
        ];

        for (delete_namespaces, delete_on_failure, failed, expected) in cases {
            let policy = NamespacePolicy {
                delete_namespaces,
                delete_on_failure,
            };
            assert_eq!(
                policy.should_delete(failed),
                expected,
                "delete={delete_namespaces} on_failure={delete_on_failure} failed={failed}"
            );
        }
    }

    #[test]
    fn test_flags_parse() {
        let ctx = TestContext::from_args([
            "--namespace",
            "reuse-me",
            "--delete-namespace-on-failure",
            "false",
            "--oci-config",
            "/etc/oci/config.yaml",
            "--ad",
            "PHX-AD-1",
        ])
        .unwrap();

        assert_eq!(ctx.existing_namespace(), Some("reuse-me"));
        assert!(ctx.delete_namespace);
        assert!(!ctx.delete_namespace_on_failure);
        assert_eq!(ctx.oci_config.as_deref(), Some("/etc/oci/config.yaml"));
        assert_eq!(ctx.ad.as_deref(), Some("PHX-AD-1"));
        assert!(!ctx.namespace_policy().should_delete(true));
    }

    #[test]
    fn test_empty_namespace_flag_is_ignored() {
        let ctx = TestContext {
            namespace: Some(String::new()),
            ..TestContext::default()
        };
        assert_eq!(ctx.existing_namespace(), None);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let result = TestContext::from_args(["--no-such-flag"]);
        assert!(matches!(result, Err(ConfigError::Flags(_))));
    }
}
