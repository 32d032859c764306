//! # Manifest Resources
//!
//! A parsed manifest document. The kinds the transform pipeline inspects are
//! decoded into their `k8s-openapi` types; everything else stays a
//! `DynamicObject` and passes through untouched.

use crate::manifest::ManifestError;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding};
use kube::api::{DynamicObject, ObjectMeta};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One resource template from the manifest
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestResource {
    Namespace(Namespace),
    RoleBinding(RoleBinding),
    ClusterRoleBinding(ClusterRoleBinding),
    /// Any other kind, or a known kind whose document did not decode into its
    /// typed form (e.g. a binding with malformed subjects)
    Other(DynamicObject),
}

impl ManifestResource {
    /// Classify a decoded document by kind
    ///
    /// `kind`, `apiVersion` and `metadata.name` are required, since nothing can
    /// be applied without them. Kind matching is case-insensitive. A document
    /// of a known kind that fails typed decoding falls back to [`ManifestResource::Other`]
    /// so that malformed-but-tolerated templates keep flowing through the
    /// pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidDocument`] when a required field is
    /// missing or the document is not an object.
    pub fn from_value(value: Value, path: &Path, index: usize) -> Result<Self, ManifestError> {
        let invalid = |reason: String| ManifestError::InvalidDocument {
            path: path.to_path_buf(),
            index,
            reason,
        };

        if !value.is_object() {
            return Err(invalid("document is not a mapping".to_string()));
        }
        let kind = required_str(&value, "/kind")
            .ok_or_else(|| invalid("missing kind".to_string()))?
            .to_string();
        required_str(&value, "/apiVersion").ok_or_else(|| invalid("missing apiVersion".to_string()))?;
        required_str(&value, "/metadata/name")
            .ok_or_else(|| invalid(format!("{kind} is missing metadata.name")))?;

        let typed = match kind.to_ascii_lowercase().as_str() {
            "namespace" => serde_json::from_value(value.clone()).map(Self::Namespace),
            "rolebinding" => serde_json::from_value(value.clone()).map(Self::RoleBinding),
            "clusterrolebinding" => serde_json::from_value(value.clone()).map(Self::ClusterRoleBinding),
            _ => return Self::dynamic(value).map_err(|e| invalid(e.to_string())),
        };

        match typed {
            Ok(resource) => Ok(resource),
            Err(e) => {
                debug!(
                    path = %path.display(),
                    index,
                    kind = %kind,
                    error = %e,
                    "Document did not decode into its typed form, keeping it as a dynamic object"
                );
                Self::dynamic(value).map_err(|e| invalid(e.to_string()))
            }
        }
    }

    fn dynamic(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value).map(Self::Other)
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Namespace(_) => <Namespace as k8s_openapi::Resource>::KIND,
            Self::RoleBinding(_) => <RoleBinding as k8s_openapi::Resource>::KIND,
            Self::ClusterRoleBinding(_) => <ClusterRoleBinding as k8s_openapi::Resource>::KIND,
            Self::Other(obj) => obj.types.as_ref().map_or("", |t| t.kind.as_str()),
        }
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        match self {
            Self::Namespace(_) => <Namespace as k8s_openapi::Resource>::API_VERSION,
            Self::RoleBinding(_) => <RoleBinding as k8s_openapi::Resource>::API_VERSION,
            Self::ClusterRoleBinding(_) => {
                <ClusterRoleBinding as k8s_openapi::Resource>::API_VERSION
            }
            Self::Other(obj) => obj.types.as_ref().map_or("", |t| t.api_version.as_str()),
        }
    }

    /// Case-insensitive kind comparison
    #[must_use]
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind().eq_ignore_ascii_case(kind)
    }

    #[must_use]
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Namespace(ns) => &ns.metadata,
            Self::RoleBinding(rb) => &rb.metadata,
            Self::ClusterRoleBinding(crb) => &crb.metadata,
            Self::Other(obj) => &obj.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Namespace(ns) => &mut ns.metadata,
            Self::RoleBinding(rb) => &mut rb.metadata,
            Self::ClusterRoleBinding(crb) => &mut crb.metadata,
            Self::Other(obj) => &mut obj.metadata,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata()
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// Render as a `DynamicObject` with `apiVersion`/`kind` set, ready for
    /// server-side apply
    ///
    /// # Errors
    ///
    /// Returns an error if the typed resource fails to serialize.
    pub fn to_dynamic(&self) -> Result<DynamicObject, serde_json::Error> {
        let value = match self {
            Self::Other(obj) => return Ok(obj.clone()),
            Self::Namespace(ns) => serde_json::to_value(ns)?,
            Self::RoleBinding(rb) => serde_json::to_value(rb)?,
            Self::ClusterRoleBinding(crb) => serde_json::to_value(crb)?,
        };
        serde_json::from_value(value)
    }
}

impl fmt::Display for ManifestResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "{}/{}/{}", self.kind(), ns, self.name()),
            None => write!(f, "{}/{}", self.kind(), self.name()),
        }
    }
}

fn required_str<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
