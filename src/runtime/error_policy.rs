//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::{HubCluster, InstanceKey};
use crate::observability;
use kube_runtime::controller::{self, Action};
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per key, so one failing instance never delays
/// the others.
pub fn handle_reconciliation_error(
    obj: Arc<HubCluster>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = InstanceKey::for_instance(&obj);

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %key.name,
        resource.namespace = %key.namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    if matches!(error, ReconcilerError::Cancelled) {
        info!("Reconcile for {} cancelled by shutdown", key);
        return Action::await_change();
    }

    error!("Reconciliation error for {}: {:?}", key, error);
    observability::metrics::increment_reconciliation_errors();

    let (delay, error_count) = ctx.record_failure(&key);
    let next_trigger_time = chrono::Duration::from_std(delay)
        .map(|d| (chrono::Utc::now() + d).to_rfc3339())
        .unwrap_or_default();

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, trigger source: error-backoff)",
        delay.as_secs(),
        error_count
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s, trigger source: error-backoff)",
        next_trigger_time,
        delay.as_secs()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Error type yielded by the `HubCluster` controller stream
pub type ControllerError = controller::Error<ReconcilerError, watcher::Error>;

/// What a controller stream error means for the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// The object vanished before its queued reconcile ran; deletions are
    /// handled by the deletion watcher
    NotFound,
    /// A reconcile failed; the error policy has already requeued it
    ReconcileFailed,
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version expired; the watcher relists on its own
    Expired,
    /// API server throttling or storage reinitializing
    TooManyRequests,
    Other,
}

/// Classify a controller stream error by variant and API status code
#[must_use]
pub fn classify_stream_error(error: &ControllerError) -> StreamErrorKind {
    match error {
        controller::Error::ObjectNotFound(_) => StreamErrorKind::NotFound,
        controller::Error::ReconcilerFailed(..) => StreamErrorKind::ReconcileFailed,
        controller::Error::QueueError(e) => classify_watch_error(e),
        controller::Error::RunnerError(_) => StreamErrorKind::Other,
    }
}

/// Classify a watcher error by the status code the API server returned
#[must_use]
pub fn classify_watch_error(error: &watcher::Error) -> StreamErrorKind {
    let code = match error {
        watcher::Error::InitialListFailed(kube::Error::Api(e))
        | watcher::Error::WatchStartFailed(kube::Error::Api(e))
        | watcher::Error::WatchFailed(kube::Error::Api(e))
        | watcher::Error::WatchError(e) => Some(e.code),
        _ => None,
    };
    match code {
        Some(401 | 403) => StreamErrorKind::Unauthorized,
        Some(410) => StreamErrorKind::Expired,
        Some(429) => StreamErrorKind::TooManyRequests,
        _ => StreamErrorKind::Other,
    }
}

/// Log a controller stream error
///
/// Never waits: the controller backs off its own watches, and a stalled
/// consumer would stall reconciles for every other key.
pub fn handle_controller_stream_error(error: &ControllerError) -> StreamErrorKind {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error
    );
    let _error_guard = error_span.enter();

    let kind = classify_stream_error(error);
    match kind {
        StreamErrorKind::NotFound => {
            info!("Queued object no longer exists, skipping: {}", error);
        }
        StreamErrorKind::ReconcileFailed => {
            if let controller::Error::ReconcilerFailed(source, obj_ref) = error {
                debug!(resource = %obj_ref, error = %source, "Reconcile failed, requeued by error policy");
            }
        }
        StreamErrorKind::Unauthorized => {
            error!("❌ Watch authentication failed (401/403) - RBAC may have been revoked or token expired: {:?}", error);
            error!("   Verify the operator ServiceAccount can list/watch hubclusters and every manifest kind");
        }
        StreamErrorKind::Expired => {
            warn!("Watch resource version expired (410) - watch will relist");
        }
        StreamErrorKind::TooManyRequests => {
            warn!("API server throttling watches (429), controller is backing off: {:?}", error);
        }
        StreamErrorKind::Other => {
            error!("Controller stream error: {:?}", error);
        }
    }
    kind
}
