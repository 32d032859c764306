use crate::constants::{HUB_SYSTEM_NAMESPACE, JOINED_CLUSTER_LABEL_KEY, JOINED_CLUSTER_LABEL_VALUE};
use crate::manifest::ManifestResource;
use crate::transform::{TransformError, Transformer};
use tracing::debug;

/// Renames the `Namespace` labelled `resource=joinedcluster` to the
/// hub-system namespace
#[derive(Debug, Clone)]
pub struct RelabelNamespaceResource {
    target: String,
}

impl RelabelNamespaceResource {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for RelabelNamespaceResource {
    fn default() -> Self {
        Self::new(HUB_SYSTEM_NAMESPACE)
    }
}

impl Transformer for RelabelNamespaceResource {
    fn name(&self) -> &'static str {
        "RelabelNamespaceResource"
    }

    fn transform(&self, mut resource: ManifestResource) -> Result<ManifestResource, TransformError> {
        if resource.is_kind("namespace")
            && resource.label(JOINED_CLUSTER_LABEL_KEY) == Some(JOINED_CLUSTER_LABEL_VALUE)
        {
            debug!(from = %resource.name(), to = %self.target, "Renaming joined-cluster namespace");
            resource.metadata_mut().name = Some(self.target.clone());
        }
        Ok(resource)
    }
}
