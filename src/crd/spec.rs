//! # HubCluster Spec
//!
//! The custom resource whose presence installs the manifest bundle and whose
//! absence tears it down.

use crate::crd::HubClusterStatus;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// HubCluster Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: onprem.operators.io/v1alpha1
/// kind: HubCluster
/// metadata:
///   name: hub1
///   namespace: team-a
/// spec: {}
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "HubCluster",
    group = "onprem.operators.io",
    version = "v1alpha1",
    namespaced,
    status = "HubClusterStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.version"}"#
)]
#[serde(rename_all = "camelCase")]
#[allow(
    clippy::empty_structs_with_brackets,
    reason = "CustomResource derive needs a braced struct; fields land here as the spec grows"
)]
pub struct HubClusterSpec {}

/// Namespace/name identity of a `HubCluster`, used as the reconcile key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub namespace: String,
    pub name: String,
}

impl InstanceKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for an object delivered by a watch event.
    /// `HubCluster` is namespaced, so a missing namespace only happens for
    /// hand-built objects and falls back to `default`.
    #[must_use]
    pub fn for_instance(instance: &HubCluster) -> Self {
        Self {
            namespace: instance.namespace().unwrap_or_else(|| "default".to_string()),
            name: instance.name_any(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
