use crate::manifest::ManifestResource;
use crate::transform::{TransformError, Transformer};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Kinds that never carry a namespace, compared lowercase
const CLUSTER_SCOPED_KINDS: [&str; 21] = [
    "componentstatus",
    "namespace",
    "node",
    "persistentvolume",
    "mutatingwebhookconfiguration",
    "validatingwebhookconfiguration",
    "customresourcedefinition",
    "apiservice",
    "meshpolicy",
    "tokenreview",
    "selfsubjectaccessreview",
    "selfsubjectrulesreview",
    "subjectaccessreview",
    "certificatesigningrequest",
    "podsecuritypolicy",
    "clusterrolebinding",
    "clusterrole",
    "priorityclass",
    "storageclass",
    "volumeattachment",
    "runtimeclass",
];

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("Failed to compile ENV_VAR regex - this should never happen")
});

#[must_use]
pub fn is_cluster_scoped(kind: &str) -> bool {
    let kind = kind.to_ascii_lowercase();
    CLUSTER_SCOPED_KINDS.contains(&kind.as_str())
}

/// Expand `$VAR` and `${VAR}` references from the process environment
///
/// Unset variables expand to an empty string.
#[must_use]
pub fn resolve_env(value: &str) -> String {
    ENV_VAR
        .replace_all(value, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_default()
        })
        .into_owned()
}

/// Sets the namespace of every namespaced resource
#[derive(Debug, Clone)]
pub struct InjectNamespace {
    namespace: String,
}

impl InjectNamespace {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Transformer for InjectNamespace {
    fn name(&self) -> &'static str {
        "InjectNamespace"
    }

    fn transform(&self, mut resource: ManifestResource) -> Result<ManifestResource, TransformError> {
        if !is_cluster_scoped(resource.kind()) {
            resource.metadata_mut().namespace = Some(self.namespace.clone());
        }
        Ok(resource)
    }
}
