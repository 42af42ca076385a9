//! # Metrics
//!
//! Prometheus registry for the e2e suite. Suites that publish results (canary
//! runs) render [`gather`] after the run.

pub mod canary;

pub use canary::{canary_metric, record_test_result};

use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Text exposition of every registered metric
pub fn gather() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
