//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use hubcluster_operator::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Manifest
pub use crate::manifest::{Manifest, ManifestError, ManifestResource, ManifestSource, ManifestStore};

// Transform pipeline
pub use crate::transform::{Pipeline, TransformError, TransformTarget, Transformer};

// Cluster I/O seam
pub use crate::cluster::{ClusterClient, ClusterError, KubeCluster};

// Reconciler types - core controller functionality
pub use crate::controller::applier::{Applier, ApplierError};
pub use crate::controller::reconciler::{
    reconcile, Outcome, Reconciler, ReconcilerError, ReconcilerSettings,
};

// Config types
pub use crate::config::{Args, ControllerConfig};
