//! # Constants
//!
//! Environment variable names, default timings and well-known values shared
//! across the e2e framework.

/// Path to the OCI auth config file used to build the block storage client
pub const OCI_CONFIG_VAR: &str = "OCICONFIG_VAR";
/// Path to the kubeconfig for the cluster under test
pub const KUBE_CONFIG_VAR: &str = "KUBECONFIG_VAR";
/// Subnet OCID used by file-share storage classes
pub const SUBNET_OCID: &str = "SUBNET_OCID";
/// Mount target OCID used by file-share storage classes
pub const MNT_TARGET_OCID: &str = "MNT_TARGET_OCID";
/// Availability domain the tests provision into
pub const AD: &str = "AD";

/// Prefix for generated test namespace names
pub const NAMESPACE_NAME_PREFIX: &str = "volume-provisioner-e2e-tests";
/// Label carrying the owning scope's base name
pub const SCOPE_LABEL: &str = "e2e-framework";

/// Interval between attempts of every bounded poll (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
/// Upper bound for namespace creation retries (seconds)
pub const DEFAULT_NAMESPACE_CREATE_TIMEOUT_SECS: u64 = 30;
/// Upper bound for waiting on namespace deletion during teardown (seconds)
pub const DEFAULT_NAMESPACE_DELETE_TIMEOUT_SECS: u64 = 300;

/// Field manager used for server-side apply of provisioner manifests
pub const FIELD_MANAGER: &str = "volume-provisioner-e2e";

/// OCI instance metadata service (v2)
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254/opc/v2";
/// Timeout for instance metadata requests (seconds)
pub const METADATA_TIMEOUT_SECS: u64 = 10;
/// Core services API version path
pub const CORE_API_VERSION: &str = "20160918";

/// Default filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "volume_provisioner_e2e=info";
