//! # Canary Metrics
//!
//! Canary suites tag each test with a bracketed metric name, e.g.
//! `"[canary_block_volume] should provision a block volume"`. The result of
//! every tagged test is published as a gauge: `1` for a failure, `0` for a
//! pass.

use super::REGISTRY;
use prometheus::{IntGaugeVec, Opts};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static METRIC_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(.*?)\]").expect("Failed to compile canary metric regex - this should never happen")
});

static TEST_FAILED: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "volume_provisioner_e2e_test_failed",
            "Result of the last run of each canary test (1 = failed, 0 = passed)",
        ),
        &["test"],
    )
    .expect("Failed to create TEST_FAILED metric - this should never happen");

    if let Err(e) = REGISTRY.register(Box::new(gauge.clone())) {
        warn!("Failed to register canary metric: {}", e);
    }
    gauge
});

/// Metric name and value for a test description, if it carries a `[name]` tag
pub fn canary_metric(description: &str, failed: bool) -> Option<(String, i64)> {
    let name = METRIC_NAME.captures(description)?.get(1)?.as_str();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), i64::from(failed)))
}

/// Record the outcome of a test; untagged descriptions are ignored
pub fn record_test_result(description: &str, failed: bool) {
    let Some((name, value)) = canary_metric(description, failed) else {
        return;
    };
    debug!(test = %name, value, "recording canary metric");
    TEST_FAILED.with_label_values(&[name.as_str()]).set(value);
}
