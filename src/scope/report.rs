//! Outcome of a scope teardown.

use crate::error::{ScopeError, StorageError};

/// What a teardown did and which cleanups failed.
///
/// Namespace failures fail the test (see [`TeardownReport::failure`]); backup
/// failures are listed for inspection only.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Namespaces confirmed gone
    pub namespaces_deleted: Vec<String>,
    /// Namespaces kept because of the deletion policy
    pub namespaces_preserved: Vec<String>,
    /// Namespaces whose deletion failed or timed out, with the cause
    pub namespace_errors: Vec<(String, ScopeError)>,
    /// Backups deleted, or already gone
    pub backups_deleted: Vec<String>,
    /// Backups that could not be deleted, with the cause
    pub backup_errors: Vec<(String, StorageError)>,
}

impl TeardownReport {
    /// Single message naming every namespace that could not be deleted
    pub fn failure(&self) -> Option<String> {
        if self.namespace_errors.is_empty() {
            return None;
        }

        let messages: Vec<String> = self
            .namespace_errors
            .iter()
            .map(|(name, error)| format!("Couldn't delete ns: {name:?}: {error}"))
            .collect();
        Some(messages.join(","))
    }

    /// No namespace or backup cleanup failed
    pub fn is_clean(&self) -> bool {
        self.namespace_errors.is_empty() && self.backup_errors.is_empty()
    }
}
