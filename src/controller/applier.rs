//! # Applier
//!
//! Converges the cluster to a transformed manifest. Applies go out in
//! manifest order so prerequisites (namespaces, CRDs) land first; deletes run
//! in reverse order.

use crate::cluster::{ClusterClient, ClusterError};
use crate::manifest::{Manifest, ManifestResource};
use crate::observability;
use kube::api::DynamicObject;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ApplierError {
    #[error("failed to render {resource}: {source}")]
    Render {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to apply {resource}: {source}")]
    Apply {
        resource: String,
        #[source]
        source: ClusterError,
    },
    #[error("failed to delete {resource}: {source}")]
    Delete {
        resource: String,
        #[source]
        source: ClusterError,
    },
}

#[derive(Clone)]
pub struct Applier {
    cluster: Arc<dyn ClusterClient>,
}

impl std::fmt::Debug for Applier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Applier").finish_non_exhaustive()
    }
}

impl Applier {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Create or update every resource, stopping at the first failure
    ///
    /// Returns the number of resources applied.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplierError`] naming the resource that failed. Resources
    /// before it stay applied; the next cycle re-applies everything.
    pub async fn apply_all(&self, manifest: &Manifest) -> Result<usize, ApplierError> {
        for resource in manifest {
            let object = render(resource)?;
            self.cluster
                .apply(&object)
                .await
                .map_err(|source| ApplierError::Apply {
                    resource: resource.to_string(),
                    source,
                })?;
            debug!(resource = %resource, "Applied");
        }

        observability::metrics::increment_resources_applied(manifest.len() as u64);
        info!(resources = manifest.len(), "Applied manifest");
        Ok(manifest.len())
    }

    /// Delete every resource in reverse manifest order
    ///
    /// Resources that are already gone are skipped. Returns the number of
    /// resources actually deleted.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplierError`] for the first delete the API server rejects.
    pub async fn delete_all(&self, manifest: &Manifest) -> Result<usize, ApplierError> {
        let mut deleted = 0;
        for resource in manifest.resources().iter().rev() {
            let object = render(resource)?;
            let existed = self
                .cluster
                .delete(&object)
                .await
                .map_err(|source| ApplierError::Delete {
                    resource: resource.to_string(),
                    source,
                })?;
            if existed {
                deleted += 1;
                debug!(resource = %resource, "Deleted");
            } else {
                debug!(resource = %resource, "Already absent");
            }
        }

        observability::metrics::increment_resources_deleted(deleted as u64);
        info!(deleted, total = manifest.len(), "Deleted manifest resources");
        Ok(deleted)
    }
}

fn render(resource: &ManifestResource) -> Result<DynamicObject, ApplierError> {
    resource.to_dynamic().map_err(|source| ApplierError::Render {
        resource: resource.to_string(),
        source,
    })
}
