//! # Manifest
//!
//! Loading and holding the ordered set of resource templates the operator
//! installs for every `HubCluster`.
//!
//! - `loader` - Reads a file or directory tree of YAML documents
//! - `resource` - Typed view over a single template
//! - `store` - Holds the most recently parsed manifest and re-parses on demand

mod loader;
mod resource;
mod store;

pub use loader::{load, parse_documents, ManifestSource};
pub use resource::ManifestResource;
pub use store::ManifestStore;

use std::path::PathBuf;
use thiserror::Error;

/// Failure to read or parse the manifest source
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk manifest directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("malformed YAML in document {index} of {path}: {source}")]
    Yaml {
        path: PathBuf,
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid resource in document {index} of {path}: {reason}")]
    InvalidDocument {
        path: PathBuf,
        index: usize,
        reason: String,
    },
}

/// An ordered sequence of resource templates
///
/// Order is apply order: callers put prerequisites such as namespaces first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    resources: Vec<ManifestResource>,
}

impl Manifest {
    #[must_use]
    pub fn new(resources: Vec<ManifestResource>) -> Self {
        Self { resources }
    }

    #[must_use]
    pub fn resources(&self) -> &[ManifestResource] {
        &self.resources
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestResource> {
        self.resources.iter()
    }
}

impl FromIterator<ManifestResource> for Manifest {
    fn from_iter<I: IntoIterator<Item = ManifestResource>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Manifest {
    type Item = ManifestResource;
    type IntoIter = std::vec::IntoIter<ManifestResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestResource;
    type IntoIter = std::slice::Iter<'a, ManifestResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}
