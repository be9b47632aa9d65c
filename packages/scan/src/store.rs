//! Project history persistence seam.
//!
//! The scan pipeline only reads history; writing new snapshots belongs to
//! the persistence layer that owns the schema.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use localrank_scan_models::HistoryEntry;

/// Errors from reading project history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The backing store could not be reached.
    #[error("Persistence unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Read access to per-project ARP history.
#[async_trait]
pub trait HistoryReader: Send + Sync {
    /// Returns the project's history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] if the store cannot be read.
    async fn load_history(&self, project: &str) -> Result<Vec<HistoryEntry>, HistoryError>;
}

/// Append-only in-memory history, keyed by project.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    projects: Mutex<BTreeMap<String, Vec<HistoryEntry>>>,
}

impl InMemoryHistory {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a snapshot to a project's history.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Unavailable`] if the lock is poisoned.
    pub fn record(&self, project: &str, entry: HistoryEntry) -> Result<(), HistoryError> {
        self.projects
            .lock()
            .map_err(|_| poisoned())?
            .entry(project.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }
}

#[async_trait]
impl HistoryReader for InMemoryHistory {
    async fn load_history(&self, project: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
        let projects = self.projects.lock().map_err(|_| poisoned())?;
        Ok(projects.get(project).cloned().unwrap_or_default())
    }
}

fn poisoned() -> HistoryError {
    HistoryError::Unavailable {
        message: "history lock poisoned".to_string(),
    }
}
