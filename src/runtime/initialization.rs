//! # Initialization
//!
//! Operator startup: rustls setup, tracing, metrics, server startup,
//! manifest loading, and Kubernetes client setup.

use crate::cluster::KubeCluster;
use crate::config::{Args, ControllerConfig};
use crate::controller::reconciler::{Reconciler, ReconcilerSettings};
use crate::controller::server::{start_server, ServerState};
use crate::crd::HubCluster;
use crate::manifest::ManifestStore;
use crate::observability;
use crate::runtime::watch_loop::owned_watch_targets;
use anyhow::{Context, Result};
use kube::api::{Api, DynamicObject};
use kube::discovery::ApiResource;
use kube::Client;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    /// API for HubCluster resources across all namespaces
    pub hubclusters: Api<HubCluster>,
    /// Watch targets for the kinds the manifest creates
    pub owned: Vec<(Api<DynamicObject>, ApiResource)>,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
    /// Flipped to `true` to cancel in-flight reconciles
    pub shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("owned_kinds", &self.owned.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// # Errors
///
/// Fails if the manifest cannot be parsed, metrics cannot be registered, or
/// no Kubernetes client can be built. All are fatal at startup.
pub async fn initialize(args: Args) -> Result<InitializationResult> {
    // Configure rustls crypto provider before anything opens a TLS connection.
    // An error only means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = ControllerConfig::from_env();
    init_tracing(&config.log_format)?;

    info!("Starting HubCluster operator v{}", crate::constants::OPERATOR_VERSION);
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(?config, ?args, "Configuration loaded");

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // A manifest that does not parse at startup is fatal
    let source = args.manifest_source();
    let manifests = Arc::new(
        ManifestStore::load(source.clone())
            .with_context(|| format!("Failed to load manifest from {}", source.path.display()))?,
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let cluster = Arc::new(KubeCluster::new(client.clone()));

    let owned = if config.watch_owned_resources {
        let resources = cluster.owned_resources(&manifests.current()).await;
        owned_watch_targets(&client, resources)
    } else {
        info!("Owned resource watch disabled - drift is corrected on the next HubCluster change");
        Vec::new()
    };

    let (shutdown, shutdown_rx) = watch::channel(false);
    let settings = ReconcilerSettings::from_config(&config, &args);
    let reconciler = Arc::new(Reconciler::new(cluster, manifests, settings, shutdown_rx));

    info!("Operator initialized, starting watch loop...");

    Ok(InitializationResult {
        hubclusters: Api::all(client),
        owned,
        reconciler,
        server_state,
        config,
        shutdown,
    })
}

fn init_tracing(log_format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hubcluster_operator=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if log_format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
