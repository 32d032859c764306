//! # Types
//!
//! Core types for the reconciler.

use crate::cluster::{ClusterClient, ClusterError};
use crate::config::{Args, ControllerConfig};
use crate::constants::{DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, OPERATOR_VERSION};
use crate::controller::applier::{Applier, ApplierError};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::stages::{default_stages, Stage};
use crate::crd::InstanceKey;
use crate::manifest::ManifestStore;
use crate::transform::TransformError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to fetch HubCluster: {0}")]
    Fetch(#[source] ClusterError),
    #[error("failed to transform manifest: {0}")]
    Transform(#[from] TransformError),
    #[error("install failed: {0}")]
    Apply(#[source] ApplierError),
    #[error("teardown failed: {0}")]
    Teardown(#[source] ApplierError),
    #[error("failed to update status: {0}")]
    StatusUpdate(#[source] ClusterError),
    #[error("reconcile cancelled by shutdown")]
    Cancelled,
}

/// What a successful cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The instance exists and the manifest was applied
    Applied { resources: usize },
    /// The instance is gone and its resources were deleted
    TornDown { deleted: usize },
}

/// Explicit configuration for the reconciler, built once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Replaces the instance namespace for namespaced resources and
    /// ServiceAccount subjects (already env-expanded)
    pub namespace_override: Option<String>,
    /// Written to `status.version` after a successful install
    pub version: String,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    /// Requeue interval after a successful cycle; `None` waits for the next change
    pub resync_interval: Option<Duration>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            namespace_override: None,
            version: OPERATOR_VERSION.to_string(),
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            resync_interval: None,
        }
    }
}

impl ReconcilerSettings {
    /// Fold the environment config and command-line flags into one value
    #[must_use]
    pub fn from_config(config: &ControllerConfig, args: &Args) -> Self {
        Self {
            namespace_override: args.namespace_override(),
            version: OPERATOR_VERSION.to_string(),
            backoff_min_secs: config.backoff_min_secs,
            backoff_max_secs: config.backoff_max_secs,
            resync_interval: config.resync_interval(),
        }
    }
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

pub struct Reconciler {
    pub(crate) cluster: Arc<dyn ClusterClient>,
    pub(crate) applier: Applier,
    pub(crate) manifests: Arc<ManifestStore>,
    pub(crate) settings: ReconcilerSettings,
    pub(crate) stages: Vec<Box<dyn Stage>>,
    pub(crate) shutdown: watch::Receiver<bool>,
    // Per-key error backoff, advanced by the error policy and reset on success
    pub backoff_states: Arc<Mutex<HashMap<InstanceKey, BackoffState>>>,
    // Serialises the controller and the deletion watcher on the same key
    pub key_locks: Arc<Mutex<HashMap<InstanceKey, Arc<AsyncMutex<()>>>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("settings", &self.settings)
            .field("manifest_source", self.manifests.source())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// `shutdown` flips to `true` when the process is stopping; in-flight
    /// cycles are abandoned at their next await point.
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        manifests: Arc<ManifestStore>,
        settings: ReconcilerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            applier: Applier::new(Arc::clone(&cluster)),
            cluster,
            manifests,
            settings,
            stages: default_stages(),
            shutdown,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            key_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    #[must_use]
    pub fn manifests(&self) -> &Arc<ManifestStore> {
        &self.manifests
    }

    /// Get or create the lock that serialises cycles for one key
    pub(crate) fn key_lock(&self, key: &InstanceKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drop the lock for `key` unless another cycle holds or awaits it
    pub(crate) fn release_key_lock(&self, key: &InstanceKey) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    /// Advance the backoff for a failed key
    ///
    /// Returns the delay before the next attempt and the consecutive error count.
    pub fn record_failure(&self, key: &InstanceKey) -> (Duration, u32) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.clone()).or_insert_with(|| {
            BackoffState::new(self.settings.backoff_min_secs, self.settings.backoff_max_secs)
        });
        state.increment_error();
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Forget the backoff for a key after a successful cycle
    pub fn reset_backoff(&self, key: &InstanceKey) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        states.remove(key);
    }
}
