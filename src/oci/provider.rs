//! # Configuration Provider Selection
//!
//! Chooses how the block storage client authenticates:
//!
//! - no config file: the default provider (`OCI_*` environment variables, then
//!   the OCI CLI config file)
//! - `useInstancePrincipals: true`: the compute instance's own identity
//! - otherwise: the static API key from the config file
//!
//! Exactly one strategy is attempted per selection; a failing strategy never
//! falls back to another one.

use crate::constants::{DEFAULT_METADATA_ENDPOINT, METADATA_TIMEOUT_SECS};
use crate::error::ProviderError;
use crate::oci::config::OciConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Which authentication strategy a provider uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Default,
    InstancePrincipal,
    Raw,
}

/// Static API-key credentials
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub tenancy_ocid: String,
    pub user_ocid: String,
    pub region: String,
    pub fingerprint: String,
    /// PEM encoded private key
    pub private_key: String,
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tenancy_ocid", &self.tenancy_ocid)
            .field("user_ocid", &self.user_ocid)
            .field("region", &self.region)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// `keyId` of the HTTP signature: `<tenancy>/<user>/<fingerprint>`
    pub fn key_id(&self) -> String {
        format!("{}/{}/{}", self.tenancy_ocid, self.user_ocid, self.fingerprint)
    }
}

/// Provider built from explicit config-file credentials
#[derive(Debug, Clone)]
pub struct RawConfigurationProvider {
    credentials: Credentials,
}

impl RawConfigurationProvider {
    pub fn new(
        tenancy_ocid: &str,
        user_ocid: &str,
        region: &str,
        fingerprint: &str,
        private_key: &str,
        passphrase: Option<&str>,
    ) -> Self {
        Self {
            credentials: Credentials {
                tenancy_ocid: tenancy_ocid.to_string(),
                user_ocid: user_ocid.to_string(),
                region: region.to_string(),
                fingerprint: fingerprint.to_string(),
                private_key: private_key.to_string(),
                passphrase: passphrase.map(str::to_string),
            },
        }
    }
}

/// Provider that authenticates as the compute instance.
///
/// Construction queries the instance metadata service, so it only succeeds on
/// an OCI instance (or against a metadata mock).
///
/// Only the region is resolved. Request signing with instance principals is
/// not supported, so [`ConfigurationProvider::credentials`] fails and a
/// backup-capable scope gets a disabled storage client: backup cleanup is a
/// no-op that reports every tracked backup in
/// [`TeardownReport::backup_errors`](crate::scope::TeardownReport::backup_errors).
#[derive(Debug, Clone)]
pub struct InstancePrincipalConfigurationProvider {
    region: String,
}

impl InstancePrincipalConfigurationProvider {
    pub async fn from_metadata(
        http: &reqwest::Client,
        metadata_endpoint: &str,
    ) -> Result<Self, ProviderError> {
        let url = format!(
            "{}/instance/canonicalRegionName",
            metadata_endpoint.trim_end_matches('/')
        );
        debug!("Querying instance metadata at {}", url);

        let response = http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, "Bearer Oracle")
            .timeout(Duration::from_secs(METADATA_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| ProviderError::InstancePrincipal(format!("instance metadata unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::InstancePrincipal(format!(
                "instance metadata returned {status} for {url}"
            )));
        }

        let region = response
            .text()
            .await
            .map_err(|e| ProviderError::InstancePrincipal(e.to_string()))?
            .trim()
            .to_string();
        if region.is_empty() {
            return Err(ProviderError::InstancePrincipal(
                "instance metadata returned an empty region".to_string(),
            ));
        }

        Ok(Self { region })
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

/// Provider resolved from the environment or the OCI CLI config file.
///
/// Nothing is read until credentials are requested, matching how the SDK's
/// default provider behaves.
#[derive(Debug, Clone)]
pub struct DefaultConfigurationProvider {
    config_file: PathBuf,
    profile: String,
}

impl Default for DefaultConfigurationProvider {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_default();
        Self {
            config_file: Path::new(&home).join(".oci").join("config"),
            profile: "DEFAULT".to_string(),
        }
    }
}

impl DefaultConfigurationProvider {
    /// Use a specific CLI config file instead of `~/.oci/config`
    pub fn with_config_file(config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            ..Self::default()
        }
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    fn credentials(&self) -> Result<Credentials, ProviderError> {
        if let Some(credentials) = credentials_from_environment()? {
            debug!("Default provider: using OCI_* environment variables");
            return Ok(credentials);
        }

        debug!("Default provider: reading {}", self.config_file.display());
        let text = std::fs::read_to_string(&self.config_file).map_err(|e| {
            ProviderError::Default(format!(
                "no OCI_* environment credentials and cannot read {}: {e}",
                self.config_file.display()
            ))
        })?;
        let values = parse_profile(&text, &self.profile).ok_or_else(|| {
            ProviderError::Default(format!(
                "profile [{}] not found in {}",
                self.profile,
                self.config_file.display()
            ))
        })?;

        let field = |key: &str| {
            values
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| {
                    ProviderError::Default(format!(
                        "{key} missing from profile [{}] in {}",
                        self.profile,
                        self.config_file.display()
                    ))
                })
        };

        let key_file = expand_home(&field("key_file")?);
        Ok(Credentials {
            tenancy_ocid: field("tenancy")?,
            user_ocid: field("user")?,
            region: field("region")?,
            fingerprint: field("fingerprint")?,
            private_key: read_key_file(&key_file)?,
            passphrase: values.get("pass_phrase").filter(|v| !v.is_empty()).cloned(),
        })
    }
}

/// Credentials from `OCI_tenancy_ocid`, `OCI_user_ocid`, ... when all are set
fn credentials_from_environment() -> Result<Option<Credentials>, ProviderError> {
    let var = |name: &str| std::env::var(format!("OCI_{name}")).ok().filter(|v| !v.is_empty());

    let (Some(tenancy), Some(user), Some(fingerprint), Some(region), Some(key_path)) = (
        var("tenancy_ocid"),
        var("user_ocid"),
        var("fingerprint"),
        var("region"),
        var("private_key_path"),
    ) else {
        return Ok(None);
    };

    Ok(Some(Credentials {
        tenancy_ocid: tenancy,
        user_ocid: user,
        region,
        fingerprint,
        private_key: read_key_file(&expand_home(&key_path))?,
        passphrase: var("private_key_password"),
    }))
}

fn read_key_file(path: &Path) -> Result<String, ProviderError> {
    std::fs::read_to_string(path).map_err(|e| {
        ProviderError::Default(format!("cannot read private key {}: {e}", path.display()))
    })
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => Path::new(&std::env::var("HOME").unwrap_or_default()).join(rest),
        None => PathBuf::from(path),
    }
}

/// Key/value pairs of one `[profile]` section of an INI-style CLI config
fn parse_profile(text: &str, profile: &str) -> Option<HashMap<String, String>> {
    let mut values: Option<HashMap<String, String>> = None;
    let mut in_profile = false;

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            if in_profile {
                values.get_or_insert_with(HashMap::new);
            }
            continue;
        }
        if !in_profile {
            continue;
        }
        if let (Some(map), Some((key, value))) = (values.as_mut(), line.split_once('=')) {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    values
}

/// The selected authentication strategy
#[derive(Debug, Clone)]
pub enum ConfigurationProvider {
    Default(DefaultConfigurationProvider),
    InstancePrincipal(InstancePrincipalConfigurationProvider),
    Raw(RawConfigurationProvider),
}

impl ConfigurationProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ConfigurationProvider::Default(_) => ProviderKind::Default,
            ConfigurationProvider::InstancePrincipal(_) => ProviderKind::InstancePrincipal,
            ConfigurationProvider::Raw(_) => ProviderKind::Raw,
        }
    }

    /// API-key credentials for request signing
    pub fn credentials(&self) -> Result<Credentials, ProviderError> {
        match self {
            ConfigurationProvider::Raw(raw) => Ok(raw.credentials.clone()),
            ConfigurationProvider::Default(default) => default.credentials(),
            ConfigurationProvider::InstancePrincipal(_) => Err(ProviderError::Unsupported(
                "instance principal signing needs a federation session token; use API-key credentials for backup cleanup",
            )),
        }
    }

    pub fn region(&self) -> Result<String, ProviderError> {
        match self {
            ConfigurationProvider::InstancePrincipal(ip) => Ok(ip.region.clone()),
            other => Ok(other.credentials()?.region.clone()),
        }
    }
}

/// Picks a [`ConfigurationProvider`] for a (possibly absent) config
#[derive(Debug, Clone)]
pub struct ProviderSelector {
    http: reqwest::Client,
    metadata_endpoint: String,
}

impl Default for ProviderSelector {
    fn default() -> Self {
        Self::with_metadata_endpoint(DEFAULT_METADATA_ENDPOINT)
    }
}

impl ProviderSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query a different instance metadata endpoint (mock servers in tests)
    pub fn with_metadata_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            metadata_endpoint: endpoint.into(),
        }
    }

    pub async fn select(
        &self,
        config: Option<&OciConfig>,
    ) -> Result<ConfigurationProvider, ProviderError> {
        let Some(config) = config else {
            info!("Using default configuration provider");
            return Ok(ConfigurationProvider::Default(
                DefaultConfigurationProvider::default(),
            ));
        };

        config.validate().map_err(ProviderError::InvalidConfig)?;

        if config.use_instance_principals {
            info!("Using instance principals configuration provider");
            let provider = InstancePrincipalConfigurationProvider::from_metadata(
                &self.http,
                &self.metadata_endpoint,
            )
            .await?;
            return Ok(ConfigurationProvider::InstancePrincipal(provider));
        }

        info!("Using raw configuration provider");
        let auth = &config.auth;
        Ok(ConfigurationProvider::Raw(RawConfigurationProvider::new(
            &auth.tenancy_ocid,
            &auth.user_ocid,
            &auth.region,
            &auth.fingerprint,
            &auth.private_key,
            auth.passphrase(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::io::Write;

    fn raw_config() -> OciConfig {
        OciConfig::from_yaml(
            r"
auth:
  region: us-ashburn-1
  tenancy: ocid1.tenancy.oc1..t
  user: ocid1.user.oc1..u
  fingerprint: 11:22:33
  key: PEM
  key_passphrase: secret
",
            "inline",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_config_selects_default_provider() {
        let provider = ProviderSelector::new().select(None).await.unwrap();
        assert_eq!(provider.kind(), ProviderKind::Default);
    }

    #[tokio::test]
    async fn test_raw_provider_carries_config_credentials() {
        let config = raw_config();
        let provider = ProviderSelector::new().select(Some(&config)).await.unwrap();

        assert_eq!(provider.kind(), ProviderKind::Raw);
        let credentials = provider.credentials().unwrap();
        assert_eq!(credentials.key_id(), "ocid1.tenancy.oc1..t/ocid1.user.oc1..u/11:22:33");
        assert_eq!(credentials.region, "us-ashburn-1");
        assert_eq!(credentials.private_key, "PEM");
        assert_eq!(credentials.passphrase.as_deref(), Some("secret"));
        assert_eq!(provider.region().unwrap(), "us-ashburn-1");
    }

    #[tokio::test]
    async fn test_invalid_config_builds_no_provider() {
        let mut config = raw_config();
        config.auth.user_ocid.clear();

        // The metadata endpoint is never contacted for an invalid config
        let selector = ProviderSelector::with_metadata_endpoint("http://127.0.0.1:9");
        match selector.select(Some(&config)).await {
            Err(ProviderError::InvalidConfig(ConfigError::Invalid(missing))) => {
                assert_eq!(missing, vec!["auth.user"]);
            }
            other => panic!("Expected invalid config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_instance_principal_failure_does_not_fall_back() {
        let config = OciConfig {
            use_instance_principals: true,
            ..raw_config()
        };

        let selector = ProviderSelector::with_metadata_endpoint("http://127.0.0.1:9");
        let err = selector.select(Some(&config)).await.unwrap_err();

        assert!(matches!(err, ProviderError::InstancePrincipal(_)));
        assert!(err.to_string().starts_with("InstancePrincipalConfigurationProvider"));
    }

    #[test]
    fn test_parse_profile_sections() {
        let text = "\
# comment
[OTHER]
user=ocid1.user.oc1..other

[DEFAULT]
user = ocid1.user.oc1..default
fingerprint=aa:bb
; another comment
key_file=~/.oci/key.pem
";
        let values = parse_profile(text, "DEFAULT").unwrap();
        assert_eq!(values["user"], "ocid1.user.oc1..default");
        assert_eq!(values["fingerprint"], "aa:bb");
        assert_eq!(values["key_file"], "~/.oci/key.pem");
        assert!(parse_profile(text, "MISSING").is_none());
    }

    #[test]
    fn test_default_provider_reads_cli_config_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.pem");
        std::fs::write(&key_path, "PEM FROM FILE").unwrap();

        let config_path = dir.path().join("config");
        let mut file = std::fs::File::create(&config_path).unwrap();
        write!(
            file,
            "[DEFAULT]\nuser=ocid1.user.oc1..u\nfingerprint=ff\ntenancy=ocid1.tenancy.oc1..t\nregion=eu-frankfurt-1\nkey_file={}\n",
            key_path.display()
        )
        .unwrap();

        let provider = ConfigurationProvider::Default(DefaultConfigurationProvider::with_config_file(&config_path));
        let credentials = provider.credentials().unwrap();

        assert_eq!(credentials.region, "eu-frankfurt-1");
        assert_eq!(credentials.private_key, "PEM FROM FILE");
        assert_eq!(credentials.passphrase, None);
    }

    #[test]
    fn test_default_provider_missing_file_errors_on_use() {
        let provider = ConfigurationProvider::Default(DefaultConfigurationProvider::with_config_file(
            "/nonexistent/.oci/config",
        ));
        // Construction never fails; resolution does
        assert!(matches!(provider.credentials(), Err(ProviderError::Default(_))));
    }

    #[test]
    fn test_instance_principal_credentials_are_unsupported() {
        let provider =
            ConfigurationProvider::InstancePrincipal(InstancePrincipalConfigurationProvider {
                region: "us-phoenix-1".to_string(),
            });
        assert_eq!(provider.region().unwrap(), "us-phoenix-1");
        assert!(matches!(provider.credentials(), Err(ProviderError::Unsupported(_))));
    }
}
