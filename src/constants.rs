//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Field manager name used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "hubcluster-operator";

/// Namespace name forced onto the joined-cluster `Namespace` template
pub const HUB_SYSTEM_NAMESPACE: &str = "onprem-hub-system";

/// Label key/value marking the `Namespace` template that gets renamed to [`HUB_SYSTEM_NAMESPACE`]
pub const JOINED_CLUSTER_LABEL_KEY: &str = "resource";
pub const JOINED_CLUSTER_LABEL_VALUE: &str = "joinedcluster";

/// Version written to `status.version` after a successful install
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default manifest source (file or directory)
pub const DEFAULT_MANIFEST_PATH: &str = "deploy/resources";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default minimum error backoff (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default maximum error backoff (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default number of keys reconciled concurrently
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 4;

/// Default delay before restarting the watch after the stream ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;
