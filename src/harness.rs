//! # Test Harness
//!
//! Glue between a [`TestScope`] and the test runner: scope errors become
//! panics (test failures), panics in the test body still get a teardown, and
//! canary-tagged tests publish their result.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use volume_provisioner_e2e::{harness, config::TestContext, scope::TestScope};
//! # async fn example(installer: Arc<dyn volume_provisioner_e2e::provisioner::ProvisionerInstaller>) {
//! let scope = TestScope::new("block-volume", installer, Arc::new(TestContext::default()));
//! harness::run_test(&scope, "[canary_block] should provision a volume", |scope| async move {
//!     let _namespace = scope.primary_namespace().expect("setup creates a namespace");
//!     // ... exercise the provisioner in `_namespace`
//! })
//! .await;
//! # }
//! ```

use crate::cleanup::CleanupRegistry;
use crate::observability::metrics::record_test_result;
use crate::scope::TestScope;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{error, info};

/// Run one test inside a setup/teardown cycle of `scope`.
///
/// # Panics
///
/// Panics when setup fails, re-raises a panic from `body`, and panics with the
/// aggregated message when test namespaces could not be deleted.
pub async fn run_test<F, Fut>(scope: &TestScope, description: &str, body: F)
where
    F: FnOnce(TestScope) -> Fut,
    Fut: Future<Output = ()>,
{
    info!(test = description, "Starting test");

    if let Err(e) = scope.setup().await {
        let report = scope.teardown(true).await;
        record_test_result(description, true);
        if let Some(failure) = report.failure() {
            error!("{}", failure);
        }
        panic!("{description}: test scope setup failed: {e}");
    }

    let outcome = AssertUnwindSafe(body(scope.clone())).catch_unwind().await;
    let failed = outcome.is_err();

    let report = scope.teardown(failed).await;
    record_test_result(description, failed);

    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
    if let Some(failure) = report.failure() {
        panic!("{failure}");
    }
    info!(test = description, "Test passed");
}

/// Run every teardown still registered, e.g. from an after-suite hook or an
/// interrupt handler. Each scope cleans up as if its test had failed.
pub async fn run_cleanup_actions(registry: &CleanupRegistry) {
    let pending = registry.len();
    if pending > 0 {
        info!("Running {} registered cleanup actions", pending);
    }
    registry.run_all().await;
}
