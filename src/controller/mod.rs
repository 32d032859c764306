//! # Controller
//!
//! Core controller modules for the HubCluster operator.
//!
//! - `applier`: Applies and deletes transformed manifests
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `reconciler`: The reconcile cycle state machine
//! - `server`: HTTP server for metrics and health checks

pub mod applier;
pub mod backoff;
pub mod reconciler;
pub mod server;
