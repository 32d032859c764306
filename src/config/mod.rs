//! # Configuration
//!
//! - `cli`: Command-line flags (manifest source, namespace override)
//! - `controller`: Runtime tuning from environment variables

pub mod cli;
pub mod controller;

pub use cli::Args;
pub use controller::ControllerConfig;
