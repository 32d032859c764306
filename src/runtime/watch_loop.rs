//! # Watch Loop
//!
//! Dispatch for `HubCluster` reconciles:
//!
//! - a `Controller` over `HubCluster` that also watches every kind in the
//!   manifest, so drift in an applied resource re-triggers its owner
//! - a deletion watcher that turns `HubCluster` delete events into teardown
//!   cycles, since the controller skips objects that no longer exist

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, shutdown_requested, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::{HubCluster, InstanceKey};
use crate::observability;
use crate::runtime::error_policy::{handle_controller_stream_error, handle_reconciliation_error};
use futures::{future, Stream, StreamExt};
use kube::api::{Api, DynamicObject};
use kube::discovery::ApiResource;
use kube_runtime::{controller, predicates, reflector, watcher, Controller, WatchStreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Run the controller watch loop until shutdown
///
/// # Errors
///
/// Currently always returns `Ok`; the watch is restarted after stream errors.
pub async fn run_watch_loop(
    hubclusters: Api<HubCluster>,
    owned: Vec<(Api<DynamicObject>, ApiResource)>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
    shutdown: watch::Sender<bool>,
) -> Result<(), anyhow::Error> {
    let shutdown = Arc::new(shutdown);

    // SIGTERM/SIGINT: mark not ready and cancel in-flight cycles
    let signal_state = Arc::clone(&server_state);
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        signal_state.set_ready(false);
        signal_shutdown.send_replace(true);
    });

    let deletion_watcher = tokio::spawn(run_deletion_watcher(
        hubclusters.clone(),
        Arc::clone(&reconciler),
        shutdown.subscribe(),
    ));

    server_state.set_ready(true);

    loop {
        if *shutdown.borrow() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!(owned_kinds = owned.len(), "Starting controller watch loop...");
        // Only spec changes (generation bumps) retrigger an instance; status
        // patches and metadata edits do not
        let (reader, writer) = reflector::store();
        let hubcluster_events = generation_changes(
            watcher(hubclusters.clone(), watcher::Config::default().any_semantic())
                .default_backoff()
                .reflect(writer),
        );

        let mut hub_controller = Controller::for_stream(hubcluster_events, reader).with_config(
            controller::Config::default().concurrency(config.max_concurrent_reconciles),
        );
        for (api, resource) in &owned {
            hub_controller =
                hub_controller.owns_with(api.clone(), resource.clone(), watcher::Config::default());
        }

        hub_controller
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .for_each(|result| {
                match result {
                    Ok((obj_ref, _action)) => debug!(resource = %obj_ref, "watch.event.success"),
                    Err(e) => {
                        handle_controller_stream_error(&e);
                    }
                }
                future::ready(())
            })
            .instrument(watch_span)
            .await;

        if *shutdown.borrow() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let restart_delay = config.watch_restart_delay();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::select! {
            () = shutdown_requested(shutdown.subscribe()) => {
                info!("Shutdown requested, exiting watch loop");
                break;
            }
            () = tokio::time::sleep(restart_delay) => {}
        }
    }

    // The controller only ends on a signal; make sure the rest follows
    shutdown.send_replace(true);
    server_state.set_ready(false);
    if let Err(e) = deletion_watcher.await {
        error!("Deletion watcher task failed: {}", e);
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Reduce `HubCluster` watch events to objects whose generation changed
pub fn generation_changes<S>(
    events: S,
) -> impl Stream<Item = Result<HubCluster, watcher::Error>> + Send + 'static
where
    S: Stream<Item = Result<watcher::Event<HubCluster>, watcher::Error>> + Send + 'static,
{
    events.applied_objects().predicate_filter(predicates::generation)
}

/// Owned-kind watch targets for every resource kind in the manifest
#[must_use]
pub fn owned_watch_targets(
    client: &kube::Client,
    resources: Vec<ApiResource>,
) -> Vec<(Api<DynamicObject>, ApiResource)> {
    resources
        .into_iter()
        .map(|resource| (Api::all_with(client.clone(), &resource), resource))
        .collect()
}

/// Watch `HubCluster` deletions and tear down each deleted instance
async fn run_deletion_watcher(
    hubclusters: Api<HubCluster>,
    reconciler: Arc<Reconciler>,
    shutdown: watch::Receiver<bool>,
) {
    info!("Starting HubCluster deletion watcher");
    let stream = watcher(hubclusters, watcher::Config::default()).default_backoff();
    let mut stream = std::pin::pin!(stream);

    loop {
        let event = tokio::select! {
            () = shutdown_requested(shutdown.clone()) => break,
            event = stream.next() => event,
        };

        match event {
            Some(Ok(watcher::Event::Delete(obj))) => {
                let key = InstanceKey::for_instance(&obj);
                info!(resource = %key, "HubCluster deleted, scheduling teardown");
                tokio::spawn(teardown_until_done(
                    key,
                    Arc::clone(&reconciler),
                    shutdown.clone(),
                ));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => warn!(error = %e, "HubCluster deletion watch error"),
            None => {
                warn!("HubCluster deletion watch ended");
                break;
            }
        }
    }
    info!("HubCluster deletion watcher stopped");
}

/// Retry the teardown cycle for a deleted key with backoff until it succeeds
/// or the operator shuts down
async fn teardown_until_done(
    key: InstanceKey,
    reconciler: Arc<Reconciler>,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        match reconciler.reconcile_key(&key).await {
            Ok(outcome) => {
                debug!(resource = %key, ?outcome, "Deletion reconcile finished");
                reconciler.reset_backoff(&key);
                return;
            }
            Err(ReconcilerError::Cancelled) => return,
            Err(e) => {
                observability::metrics::increment_reconciliation_errors();
                let (delay, error_count) = reconciler.record_failure(&key);
                warn!(
                    resource = %key,
                    error = %e,
                    error_count,
                    "Teardown failed, retrying in {}s",
                    delay.as_secs()
                );
                observability::metrics::increment_requeues_total("teardown-retry");
                tokio::select! {
                    () = shutdown_requested(shutdown.clone()) => return,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
