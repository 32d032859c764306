//! # Transform Pipeline
//!
//! Ordered, pure mutations applied to every manifest resource before it is
//! sent to the cluster.
//!
//! - `owner` - Sets the controller owner reference to the instance
//! - `namespace` - Moves namespaced resources into the target namespace
//! - `subjects` - Points a binding's first ServiceAccount subject at the target namespace
//! - `relabel` - Renames the joined-cluster `Namespace` to the hub-system namespace
//!
//! Every transformer is idempotent, so running a pipeline twice yields the
//! same manifest as running it once.

mod namespace;
mod owner;
mod relabel;
mod subjects;

pub use namespace::{is_cluster_scoped, resolve_env, InjectNamespace};
pub use owner::InjectOwner;
pub use relabel::RelabelNamespaceResource;
pub use subjects::RewriteSubjectNamespace;

use crate::crd::{HubCluster, InstanceKey};
use crate::manifest::{Manifest, ManifestResource};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("cannot build an owner reference for {instance}: object has no uid")]
    MissingOwnerReference { instance: String },
    #[error("{stage} failed on {resource}: {message}")]
    Failed {
        stage: &'static str,
        resource: String,
        message: String,
    },
}

/// A single mutation step
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns a [`TransformError`] when the resource cannot be transformed.
    /// Branches that are documented as no-ops return the resource unchanged.
    fn transform(&self, resource: ManifestResource) -> Result<ManifestResource, TransformError>;
}

/// What a pipeline is bound to
#[derive(Debug, Clone, PartialEq)]
pub struct TransformTarget {
    /// Namespace that namespaced resources and ServiceAccount subjects move into
    pub namespace: String,
    /// Instance name, for log context
    pub name: String,
    /// Owner reference to stamp on every resource. `None` when the instance
    /// is gone and the pipeline only needs to reproduce resource identities.
    pub owner: Option<OwnerReference>,
}

impl TransformTarget {
    /// Target for a live instance
    ///
    /// `namespace_override` replaces the instance namespace when set.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingOwnerReference`] if the instance has
    /// not been persisted yet (no uid).
    pub fn for_instance(
        instance: &HubCluster,
        namespace_override: Option<&str>,
    ) -> Result<Self, TransformError> {
        let key = InstanceKey::for_instance(instance);
        let owner = instance
            .controller_owner_ref(&())
            .ok_or_else(|| TransformError::MissingOwnerReference {
                instance: key.to_string(),
            })?;
        Ok(Self {
            namespace: namespace_override.map_or(key.namespace, str::to_string),
            name: instance.name_any(),
            owner: Some(owner),
        })
    }

    /// Target for an instance that no longer exists
    #[must_use]
    pub fn for_key(key: &InstanceKey, namespace_override: Option<&str>) -> Self {
        Self {
            namespace: namespace_override.unwrap_or(&key.namespace).to_string(),
            name: key.name.clone(),
            owner: None,
        }
    }
}

/// Left-to-right composition of transformers
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Transformer>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, stage: impl Transformer + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// The standard pipeline for a target:
    /// InjectOwner, InjectNamespace, RewriteSubjectNamespace, RelabelNamespaceResource.
    /// InjectOwner is left out when the target carries no owner.
    #[must_use]
    pub fn for_target(target: &TransformTarget) -> Self {
        let mut pipeline = Self::new();
        if let Some(owner) = &target.owner {
            pipeline = pipeline.with(InjectOwner::new(owner.clone()));
        }
        pipeline
            .with(InjectNamespace::new(&target.namespace))
            .with(RewriteSubjectNamespace::new(&target.namespace))
            .with(RelabelNamespaceResource::default())
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one resource through every stage in order
    ///
    /// # Errors
    ///
    /// Returns the first [`TransformError`] raised by a stage.
    pub fn transform(&self, resource: ManifestResource) -> Result<ManifestResource, TransformError> {
        self.stages
            .iter()
            .try_fold(resource, |resource, stage| stage.transform(resource))
    }

    /// Transform a whole manifest, preserving order
    ///
    /// # Errors
    ///
    /// Any stage error aborts the whole manifest.
    pub fn apply(&self, manifest: Manifest) -> Result<Manifest, TransformError> {
        let transformed = manifest
            .into_iter()
            .map(|resource| self.transform(resource))
            .collect::<Result<Manifest, _>>()?;
        debug!(
            stages = ?self.stage_names(),
            resources = transformed.len(),
            "Transformed manifest"
        );
        Ok(transformed)
    }
}
