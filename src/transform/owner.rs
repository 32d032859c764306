use crate::manifest::ManifestResource;
use crate::transform::{TransformError, Transformer};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Sets the owner reference of every resource to the instance
///
/// Existing owner references are replaced, so each applied resource has the
/// instance as its only (controller) owner.
#[derive(Debug, Clone)]
pub struct InjectOwner {
    owner: OwnerReference,
}

impl InjectOwner {
    #[must_use]
    pub fn new(owner: OwnerReference) -> Self {
        Self { owner }
    }
}

impl Transformer for InjectOwner {
    fn name(&self) -> &'static str {
        "InjectOwner"
    }

    fn transform(&self, mut resource: ManifestResource) -> Result<ManifestResource, TransformError> {
        resource.metadata_mut().owner_references = Some(vec![self.owner.clone()]);
        Ok(resource)
    }
}
