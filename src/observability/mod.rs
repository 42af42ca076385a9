//! # Observability
//!
//! Logging setup and canary metrics for e2e runs.

pub mod metrics;

use crate::constants::DEFAULT_LOG_FILTER;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install the rustls crypto provider and a fmt tracing subscriber.
///
/// Safe to call from every test: a provider or subscriber that is already
/// installed is left in place. Output goes through the libtest writer so it is
/// captured per test.
pub fn init() {
    // Required for rustls 0.23+ before any TLS connection (kube, reqwest)
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    let subscriber_installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_test_writer()
        .try_init()
        .is_ok();

    debug!(provider_installed, subscriber_installed, "observability initialized");
}
