//! # Reconciler
//!
//! Drives one `HubCluster` key through a reconcile cycle:
//!
//! ```text
//! Fetch ─┬─ NotFound ─▶ Teardown (DeleteAll)
//!        └─ Found ────▶ Install ─▶ RecordStatus ─▶ RefreshManifest
//! ```
//!
//! Not-found is not an error. Any other failure aborts the cycle and is
//! returned to the dispatch layer, which retries it with backoff.

mod stages;
mod types;

pub use stages::{Cycle, Install, RecordStatus, RefreshManifest, Stage};
pub use types::{BackoffState, Outcome, Reconciler, ReconcilerError, ReconcilerSettings};

use crate::crd::{HubCluster, InstanceKey};
use crate::observability;
use crate::transform::{Pipeline, TransformTarget};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, info_span, Instrument};

impl Reconciler {
    /// Run one cycle for `key`
    ///
    /// Cycles for the same key never overlap. A shutdown signal abandons the
    /// cycle with [`ReconcilerError::Cancelled`]; every step is idempotent so
    /// the next start resumes safely.
    ///
    /// # Errors
    ///
    /// Returns the [`ReconcilerError`] of the first step that failed.
    pub async fn reconcile_key(&self, key: &InstanceKey) -> Result<Outcome, ReconcilerError> {
        let span = info_span!(
            "reconcile",
            resource.namespace = %key.namespace,
            resource.name = %key.name
        );

        let lock = self.key_lock(key);
        let cycle = async move {
            let _guard = lock.lock().await;
            self.run_cycle(key).await
        };

        let result = async {
            tokio::select! {
                biased;
                () = shutdown_requested(self.shutdown.clone()) => {
                    info!("Shutdown requested, abandoning reconcile");
                    Err(ReconcilerError::Cancelled)
                }
                result = cycle => result,
            }
        }
        .instrument(span)
        .await;

        // A torn-down key has nothing left to serialise
        if matches!(result, Ok(Outcome::TornDown { .. })) {
            self.release_key_lock(key);
        }
        result
    }

    async fn run_cycle(&self, key: &InstanceKey) -> Result<Outcome, ReconcilerError> {
        let start = Instant::now();
        observability::metrics::increment_reconciliations();
        info!("Reconciling HubCluster");

        let result = match self.cluster.get_instance(key).await {
            Ok(None) => self.teardown(key).await,
            Ok(Some(instance)) => self.install(key, instance).await,
            Err(e) => Err(ReconcilerError::Fetch(e)),
        };

        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if result.is_ok() {
            info!("Finished reconciling HubCluster");
        }
        result
    }

    async fn install(&self, key: &InstanceKey, instance: HubCluster) -> Result<Outcome, ReconcilerError> {
        let mut cycle = Cycle::new(key.clone(), instance);
        for stage in &self.stages {
            debug!(stage = stage.name(), "Running stage");
            stage.run(self, &mut cycle).await?;
        }
        Ok(Outcome::Applied {
            resources: cycle.applied,
        })
    }

    /// Delete everything the manifest would have created for `key`
    ///
    /// The instance is gone, so the manifest goes through the
    /// namespace-dependent transforms only; that reproduces the identities
    /// that were applied. No status is written.
    async fn teardown(&self, key: &InstanceKey) -> Result<Outcome, ReconcilerError> {
        info!("HubCluster not found, tearing down managed resources");
        let target = TransformTarget::for_key(key, self.settings.namespace_override.as_deref());
        let manifest = Pipeline::for_target(&target).apply(self.manifests.snapshot())?;

        let deleted = self
            .applier
            .delete_all(&manifest)
            .await
            .map_err(ReconcilerError::Teardown)?;
        observability::metrics::increment_teardowns();
        Ok(Outcome::TornDown { deleted })
    }
}

/// Resolves once shutdown is signalled; never resolves if the sender is gone
pub(crate) async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Controller entry point
///
/// # Errors
///
/// Propagates the cycle error to the error policy.
pub async fn reconcile(
    instance: Arc<HubCluster>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let key = InstanceKey::for_instance(&instance);
    ctx.reconcile_key(&key).await?;
    ctx.reset_backoff(&key);

    Ok(match ctx.settings.resync_interval {
        Some(interval) => {
            observability::metrics::increment_requeues_total("resync");
            Action::requeue(interval)
        }
        None => Action::await_change(),
    })
}
