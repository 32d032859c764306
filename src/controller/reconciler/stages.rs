//! # Stages
//!
//! The steps a cycle runs for an instance that exists, in order:
//!
//! 1. `Install` - transform the manifest for the instance and apply it
//! 2. `RecordStatus` - write the operator version to `status.version`
//! 3. `RefreshManifest` - reparse the templates for the next cycle
//!
//! A stage error aborts the cycle; later stages do not run.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::{HubCluster, HubClusterStatus, InstanceKey};
use crate::transform::{Pipeline, TransformTarget};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State carried between the stages of one cycle
#[derive(Debug)]
pub struct Cycle {
    pub key: InstanceKey,
    pub instance: HubCluster,
    /// Number of resources applied by `Install`
    pub applied: usize,
}

impl Cycle {
    #[must_use]
    pub fn new(key: InstanceKey, instance: HubCluster) -> Self {
        Self {
            key,
            instance,
            applied: 0,
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, reconciler: &Reconciler, cycle: &mut Cycle) -> Result<(), ReconcilerError>;
}

pub(crate) fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![Box::new(Install), Box::new(RecordStatus), Box::new(RefreshManifest)]
}

#[derive(Debug)]
pub struct Install;

#[async_trait]
impl Stage for Install {
    fn name(&self) -> &'static str {
        "Install"
    }

    async fn run(&self, reconciler: &Reconciler, cycle: &mut Cycle) -> Result<(), ReconcilerError> {
        let target = TransformTarget::for_instance(
            &cycle.instance,
            reconciler.settings.namespace_override.as_deref(),
        )?;
        // Each cycle transforms its own copy; the stored manifest stays pristine
        let manifest = Pipeline::for_target(&target).apply(reconciler.manifests.snapshot())?;

        cycle.applied = reconciler
            .applier
            .apply_all(&manifest)
            .await
            .map_err(ReconcilerError::Apply)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct RecordStatus;

#[async_trait]
impl Stage for RecordStatus {
    fn name(&self) -> &'static str {
        "RecordStatus"
    }

    async fn run(&self, reconciler: &Reconciler, cycle: &mut Cycle) -> Result<(), ReconcilerError> {
        let desired = HubClusterStatus {
            version: Some(reconciler.settings.version.clone()),
        };
        if cycle.instance.status.as_ref() == Some(&desired) {
            debug!(version = %reconciler.settings.version, "Status already current");
            return Ok(());
        }

        reconciler
            .cluster
            .update_status(&cycle.key, &desired)
            .await
            .map_err(ReconcilerError::StatusUpdate)?;
        cycle.instance.status = Some(desired);
        info!(version = %reconciler.settings.version, "Install succeeded");
        Ok(())
    }
}

#[derive(Debug)]
pub struct RefreshManifest;

#[async_trait]
impl Stage for RefreshManifest {
    fn name(&self) -> &'static str {
        "RefreshManifest"
    }

    /// Never fails the cycle: a bad reparse keeps the previous manifest
    async fn run(&self, reconciler: &Reconciler, _cycle: &mut Cycle) -> Result<(), ReconcilerError> {
        let store = Arc::clone(&reconciler.manifests);
        match tokio::task::spawn_blocking(move || store.reparse()).await {
            Ok(Ok(resources)) => debug!(resources, "Manifest refreshed"),
            // The store logs the parse failure
            Ok(Err(_)) => {}
            Err(e) => warn!(error = %e, "Manifest reparse task failed, keeping previous manifest"),
        }
        Ok(())
    }
}
