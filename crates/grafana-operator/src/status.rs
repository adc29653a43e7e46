//! # Status Reconciler
//!
//! Writes a Grafana's status only when it differs from what is currently
//! stored. The comparison is against a fresh read, not the copy the
//! reconcile started from, so a status advanced by another writer in the
//! meantime is not clobbered needlessly.

use crate::crds::Grafana;
use crate::error::Result;
use crate::store::GrafanaStore;
use std::sync::Arc;
use tracing::debug;

/// What a status sync did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Unchanged,
    Written,
    /// Another writer got there first; treated as success
    Conflicted,
}

#[derive(Clone)]
pub struct StatusSyncer {
    store: Arc<dyn GrafanaStore>,
}

impl StatusSyncer {
    pub fn new(store: Arc<dyn GrafanaStore>) -> Self {
        Self { store }
    }

    /// Persist `desired.status` if it differs from the stored status
    pub async fn sync_status(&self, desired: &Grafana) -> Result<StatusOutcome> {
        let key = desired.key()?;
        let current = self.store.get(&key).await?;

        if desired.status == current.status {
            debug!(grafana = %key, "status unchanged, skipping write");
            return Ok(StatusOutcome::Unchanged);
        }

        match self.store.update_status(desired).await {
            Ok(()) => Ok(StatusOutcome::Written),
            Err(e) if e.is_conflict() => {
                debug!(grafana = %key, error = %e, "status write conflicted, ignoring");
                Ok(StatusOutcome::Conflicted)
            }
            Err(e) => Err(e),
        }
    }
}
