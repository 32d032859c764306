//! # Runtime
//!
//! - `initialization`: Startup of tracing, metrics, server, manifest and client
//! - `watch_loop`: Controller and deletion watcher
//! - `error_policy`: Backoff for failed reconciles and watch stream errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
