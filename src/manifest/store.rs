//! # Manifest Store
//!
//! Holds the most recently parsed manifest. Reconcile cycles take an owned
//! snapshot to transform, so the stored copy only ever changes through
//! [`ManifestStore::reparse`] and always reflects the on-disk templates.

use crate::manifest::{load, Manifest, ManifestError, ManifestSource};
use crate::observability;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct ManifestStore {
    source: ManifestSource,
    current: RwLock<Arc<Manifest>>,
}

impl ManifestStore {
    /// Parse the source for the first time
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] if the source cannot be parsed. Callers
    /// treat this as fatal at startup.
    pub fn load(source: ManifestSource) -> Result<Self, ManifestError> {
        let manifest = load(&source)?;
        Ok(Self::with_manifest(source, manifest))
    }

    /// Build a store around an already-parsed manifest
    #[must_use]
    pub fn with_manifest(source: ManifestSource, manifest: Manifest) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(manifest)),
        }
    }

    #[must_use]
    pub fn source(&self) -> &ManifestSource {
        &self.source
    }

    /// Shared handle to the current manifest
    #[must_use]
    pub fn current(&self) -> Arc<Manifest> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Owned copy of the current manifest for one reconcile cycle to transform
    #[must_use]
    pub fn snapshot(&self) -> Manifest {
        self.current().as_ref().clone()
    }

    /// Re-read the source and replace the held manifest
    ///
    /// On failure the previous manifest is kept and the error is returned for
    /// the caller to log.
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] if the source no longer parses.
    pub fn reparse(&self) -> Result<usize, ManifestError> {
        match load(&self.source) {
            Ok(manifest) => {
                let count = manifest.len();
                let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
                *guard = Arc::new(manifest);
                debug!(resources = count, "Manifest reparsed");
                Ok(count)
            }
            Err(e) => {
                observability::metrics::increment_manifest_reparse_failures();
                warn!(
                    path = %self.source.path.display(),
                    error = %e,
                    "Manifest reparse failed, keeping previous manifest"
                );
                Err(e)
            }
        }
    }
}
