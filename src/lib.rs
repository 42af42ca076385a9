//! # Volume Provisioner E2E
//!
//! Per-test lifecycle management for end-to-end tests of the OCI volume
//! provisioner running in Kubernetes.
//!
//! ## Overview
//!
//! Every test runs inside a [`scope::TestScope`] cycle:
//!
//! 1. **Setup** - registers an emergency teardown, connects to the cluster,
//!    creates a uniquely named namespace (or reuses `--namespace`), builds a
//!    block storage client for backup tests and installs the file-share and
//!    block provisioners
//! 2. **Test body** - runs against the scope's namespace, tracking any extra
//!    namespaces or volume backups it creates
//! 3. **Teardown** - deletes tracked namespaces (kept for inspection when the
//!    deletion policy says so) and tracked backups
//!
//! If a suite aborts mid-test, [`harness::run_cleanup_actions`] runs every
//! teardown that is still registered.
//!
//! ## Configuration
//!
//! Suite settings come from [`config::TestContext`] (flags and `E2E_*`
//! variables). Named values such as `OCICONFIG_VAR` or `SUBNET_OCID` are read
//! from the environment first and the test context second. Set `RUST_LOG` to
//! tune logging after [`observability::init`].

pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod harness;
pub mod oci;
pub mod observability;
pub mod poll;
pub mod provisioner;
pub mod scope;

pub use cleanup::{CleanupHandle, CleanupRegistry};
pub use config::{Lookup, NamespacePolicy, TestContext};
pub use error::{ScopeError, StorageError};
pub use scope::{TeardownReport, TestScope};
