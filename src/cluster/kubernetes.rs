//! # Kubernetes Cluster Client
//!
//! [`ClusterClient`] backed by a live API server. Manifest objects are applied
//! with server-side apply as `DynamicObject`s; their API resource is resolved
//! through discovery once per kind and cached.

use crate::cluster::{ClusterClient, ClusterError};
use crate::constants::FIELD_MANAGER;
use crate::crd::{HubCluster, HubClusterStatus, InstanceKey};
use crate::manifest::Manifest;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiCapabilities, ApiResource, Scope};
use kube::{Client, ResourceExt};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct KubeCluster {
    client: Client,
    resources: RwLock<HashMap<GroupVersionKind, (ApiResource, ApiCapabilities)>>,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a kind to its API resource and scope, caching the result
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::UnknownKind`] if the API server does not serve
    /// the kind, or [`ClusterError::Kube`] if discovery fails.
    pub async fn resolve(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<(ApiResource, ApiCapabilities), ClusterError> {
        let (group, version) = parse_api_version(api_version);
        let gvk = GroupVersionKind::gvk(&group, &version, kind);

        if let Some(found) = self.resources.read().await.get(&gvk) {
            return Ok(found.clone());
        }

        let resolved = match discovery::pinned_kind(&self.client, &gvk).await {
            Ok(resolved) => resolved,
            Err(kube::Error::Discovery(_)) => {
                return Err(ClusterError::UnknownKind {
                    api_version: api_version.to_string(),
                    kind: kind.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        debug!(api_version, kind, plural = %resolved.0.plural, "Resolved API resource");
        self.resources.write().await.insert(gvk, resolved.clone());
        Ok(resolved)
    }

    async fn api_for(&self, object: &DynamicObject) -> Result<(Api<DynamicObject>, String), ClusterError> {
        let types = object.types.as_ref().ok_or(ClusterError::MissingField("apiVersion/kind"))?;
        let name = object
            .metadata
            .name
            .clone()
            .ok_or(ClusterError::MissingField("metadata.name"))?;
        let (resource, caps) = self.resolve(&types.api_version, &types.kind).await?;

        let api = match (&caps.scope, object.metadata.namespace.as_deref()) {
            (Scope::Namespaced, Some(namespace)) => {
                Api::namespaced_with(self.client.clone(), namespace, &resource)
            }
            (Scope::Namespaced, None) => Api::default_namespaced_with(self.client.clone(), &resource),
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &resource),
        };
        Ok((api, name))
    }

    /// API resources for every distinct kind in the manifest
    ///
    /// Kinds that cannot be resolved are logged and left out, so a missing
    /// CRD does not stop the controller from starting.
    pub async fn owned_resources(&self, manifest: &Manifest) -> Vec<ApiResource> {
        let kinds: BTreeSet<(String, String)> = manifest
            .iter()
            .map(|r| (r.api_version().to_string(), r.kind().to_string()))
            .collect();

        let mut resources = Vec::with_capacity(kinds.len());
        for (api_version, kind) in kinds {
            match self.resolve(&api_version, &kind).await {
                Ok((resource, _)) => resources.push(resource),
                Err(e) => warn!(
                    api_version = %api_version,
                    kind = %kind,
                    error = %e,
                    "Cannot watch owned kind, drift on it will not trigger reconciles"
                ),
            }
        }
        info!(kinds = resources.len(), "Resolved owned resource kinds");
        resources
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get_instance(&self, key: &InstanceKey) -> Result<Option<HubCluster>, ClusterError> {
        let api: Api<HubCluster> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn apply(&self, object: &DynamicObject) -> Result<(), ClusterError> {
        let (api, name) = self.api_for(object).await?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(object)).await?;
        Ok(())
    }

    async fn delete(&self, object: &DynamicObject) -> Result<bool, ClusterError> {
        let (api, name) = self.api_for(object).await?;
        match api.delete(&name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(name = %object.name_any(), "Already absent");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(
        &self,
        key: &InstanceKey,
        status: &HubClusterStatus,
    ) -> Result<(), ClusterError> {
        let api: Api<HubCluster> = Api::namespaced(self.client.clone(), &key.namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}

/// Split `apiVersion` into group and version; the core group is empty
#[must_use]
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}
