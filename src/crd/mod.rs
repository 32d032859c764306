//! # Custom Resource Definitions
//!
//! CRD types for the HubCluster operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `HubCluster` resource and its (empty) desired-state spec
//! - `status.rs` - Observed state written back after a successful install

mod spec;
mod status;

pub use spec::{HubCluster, HubClusterSpec, InstanceKey};
pub use status::HubClusterStatus;
