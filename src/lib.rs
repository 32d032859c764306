//! HubCluster Operator Library
//!
//! Reconciles `HubCluster` custom resources: while an instance exists, the
//! manifest bundle is transformed for it and applied; once it is deleted,
//! the bundle is torn down.
//!
//! ## Quick Start
//!
//! ```rust
//! use hubcluster_operator::prelude::*;
//! ```

pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod manifest;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod transform;
