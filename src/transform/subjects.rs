use crate::manifest::ManifestResource;
use crate::transform::{TransformError, Transformer};
use k8s_openapi::api::rbac::v1::Subject;
use serde_json::Value;
use tracing::debug;

const SERVICE_ACCOUNT: &str = "ServiceAccount";

/// Points the first subject of a RoleBinding/ClusterRoleBinding at the target
/// namespace when that subject is a ServiceAccount
///
/// Permissive: absent or malformed subjects, or a first subject of another
/// kind, leave the resource unchanged and are only logged.
#[derive(Debug, Clone)]
pub struct RewriteSubjectNamespace {
    namespace: String,
}

impl RewriteSubjectNamespace {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn rewrite_typed(&self, subjects: Option<&mut Vec<Subject>>, resource: &str) {
        match subjects.and_then(|s| s.first_mut()) {
            Some(subject) if subject.kind == SERVICE_ACCOUNT => {
                subject.namespace = Some(self.namespace.clone());
                debug!(resource, namespace = %self.namespace, "Set ServiceAccount subject namespace");
            }
            Some(subject) => {
                debug!(resource, subject.kind = %subject.kind, "First subject is not a ServiceAccount, leaving binding unchanged");
            }
            None => debug!(resource, "Binding has no subjects, leaving it unchanged"),
        }
    }

    /// Bindings whose subjects did not decode into the typed form
    fn rewrite_untyped(&self, data: &mut Value, resource: &str) {
        let Some(first) = data
            .get_mut("subjects")
            .and_then(Value::as_array_mut)
            .and_then(|subjects| subjects.first_mut())
            .and_then(Value::as_object_mut)
        else {
            debug!(resource, "Binding subjects are absent or malformed, leaving it unchanged");
            return;
        };

        if first.get("kind").and_then(Value::as_str) == Some(SERVICE_ACCOUNT) {
            first.insert("namespace".to_string(), Value::String(self.namespace.clone()));
            debug!(resource, namespace = %self.namespace, "Set ServiceAccount subject namespace");
        } else {
            debug!(resource, "First subject is not a ServiceAccount, leaving binding unchanged");
        }
    }
}

impl Transformer for RewriteSubjectNamespace {
    fn name(&self) -> &'static str {
        "RewriteSubjectNamespace"
    }

    fn transform(&self, mut resource: ManifestResource) -> Result<ManifestResource, TransformError> {
        let label = resource.to_string();
        match &mut resource {
            ManifestResource::RoleBinding(rb) => self.rewrite_typed(rb.subjects.as_mut(), &label),
            ManifestResource::ClusterRoleBinding(crb) => {
                self.rewrite_typed(crb.subjects.as_mut(), &label);
            }
            ManifestResource::Other(obj)
                if resource_is_binding(obj.types.as_ref().map(|t| t.kind.as_str())) =>
            {
                self.rewrite_untyped(&mut obj.data, &label);
            }
            ManifestResource::Namespace(_) | ManifestResource::Other(_) => {}
        }
        Ok(resource)
    }
}

fn resource_is_binding(kind: Option<&str>) -> bool {
    kind.is_some_and(|k| {
        k.eq_ignore_ascii_case("rolebinding") || k.eq_ignore_ascii_case("clusterrolebinding")
    })
}
