//! # Cluster
//!
//! The seam between the reconciler and the Kubernetes API. Everything the
//! reconcile cycle reads or writes goes through [`ClusterClient`], so the
//! state machine can be driven against an in-memory cluster in tests.

mod kubernetes;

pub use kubernetes::{parse_api_version, KubeCluster};

use crate::crd::{HubCluster, HubClusterStatus, InstanceKey};
use async_trait::async_trait;
use kube::api::DynamicObject;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("no API resource found for {api_version}/{kind}")]
    UnknownKind { api_version: String, kind: String },
    #[error("object is missing {0}")]
    MissingField(&'static str),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch the instance. `Ok(None)` means it does not exist.
    async fn get_instance(&self, key: &InstanceKey) -> Result<Option<HubCluster>, ClusterError>;

    /// Create or update an object by server-side apply
    async fn apply(&self, object: &DynamicObject) -> Result<(), ClusterError>;

    /// Delete an object. Returns `false` if it was already absent.
    async fn delete(&self, object: &DynamicObject) -> Result<bool, ClusterError>;

    /// Persist the status subresource of the instance
    async fn update_status(
        &self,
        key: &InstanceKey,
        status: &HubClusterStatus,
    ) -> Result<(), ClusterError>;
}
