/**
 * HEALTH RECONCILER - Ping a registered host and persist its status
 *
 * ROLE:
 * Turns a reachability probe into stored state: read the host by address,
 * probe it, store the new UP/DOWN status, return the fresh record.
 * Only the status is written: edits made while the probe runs are kept.
 *
 * CONCURRENCY:
 * - The read-probe-write sequence spans a network round trip
 * - Reconciliations of the same address are single-flighted: one probe runs,
 *   concurrent callers share its outcome, so interleaved writes cannot
 *   overwrite a fresh status with a stale one
 * - Different addresses reconcile in parallel
 *
 * FAILURES:
 * - Unknown address -> NotFound, nothing written
 * - Probe error (bad address) -> propagated, nothing written
 * - Store error on write -> propagated as-is
 */

use crate::models::{HostRecord, HostStatus};
use crate::probe::{ProbeError, Prober};
use crate::singleflight::SingleFlight;
use crate::store::{HostStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("no host registered at address {0}")]
    NotFound(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("reconciliation of {0} was interrupted")]
    Interrupted(String),
}

/// Outcome shared between all callers coalesced onto one reconciliation.
pub type ReconcileResult = Result<HostRecord, Arc<ReconcileError>>;

#[derive(Clone)]
pub struct HealthReconciler {
    store: Arc<dyn HostStore>,
    prober: Arc<dyn Prober>,
    timeout: Duration,
    flights: Arc<SingleFlight<String, ReconcileResult>>,
}

impl HealthReconciler {
    pub fn new(store: Arc<dyn HostStore>, prober: Arc<dyn Prober>, timeout: Duration) -> Self {
        Self {
            store,
            prober,
            timeout,
            flights: Arc::new(SingleFlight::new()),
        }
    }

    pub async fn reconcile(&self, address: &str) -> ReconcileResult {
        let key = address.trim().to_string();
        let this = self.clone();
        let target = key.clone();
        let job = async move { this.reconcile_once(&target).await.map_err(Arc::new) };

        match self.flights.run(key.clone(), job).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(address = %key, "reconciliation task aborted");
                Err(Arc::new(ReconcileError::Interrupted(key)))
            }
        }
    }

    async fn reconcile_once(&self, address: &str) -> Result<HostRecord, ReconcileError> {
        info!(address, "pinging host");
        let record = self
            .store
            .get_by_address(address)?
            .ok_or_else(|| ReconcileError::NotFound(address.to_string()))?;

        let reachable = self.prober.probe(&record.address, self.timeout).await?;
        let previous = record.status;

        let updated = self.store.set_status(record.id, HostStatus::from_reachable(reachable))?;
        info!(
            id = updated.id,
            address = %updated.address,
            from = previous.as_str(),
            to = updated.status.as_str(),
            "host status reconciled"
        );
        Ok(updated)
    }
}
