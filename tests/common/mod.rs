//! Common test utilities for reconciler integration tests
//!
//! Provides an in-memory [`ClusterClient`] that records every write, and a
//! small manifest bundle written to a temporary directory.

#![allow(dead_code, reason = "each test binary uses a different subset of the helpers")]

use async_trait::async_trait;
use hubcluster_operator::cluster::{ClusterClient, ClusterError};
use hubcluster_operator::crd::{HubCluster, HubClusterSpec, HubClusterStatus, InstanceKey};
use hubcluster_operator::manifest::{ManifestSource, ManifestStore};
use kube::api::{DynamicObject, ObjectMeta};
use kube::core::ErrorResponse;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Bundle used by most tests: a joined-cluster namespace, a namespaced
/// ServiceAccount, a cluster-scoped ClusterRole and two bindings.
pub const BUNDLE: &str = r"
apiVersion: v1
kind: Namespace
metadata:
  name: joined
  labels:
    resource: joinedcluster
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: hub-agent
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: hub-agent
rules:
  - apiGroups: ['']
    resources: ['configmaps']
    verbs: ['get']
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: hub-agent
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: hub-agent
subjects:
  - kind: ServiceAccount
    name: hub-agent
    namespace: default
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: hub-agent
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: hub-agent
subjects:
  - kind: ServiceAccount
    name: hub-agent
    namespace: default
";

pub const BUNDLE_LEN: usize = 5;

/// `(kind, namespace, name)` of an object
pub type Identity = (String, Option<String>, String);

/// In-memory cluster: objects are stored by identity, and every apply,
/// delete and status write is also logged
#[derive(Default)]
pub struct FakeCluster {
    instances: Mutex<HashMap<InstanceKey, HubCluster>>,
    objects: Mutex<BTreeMap<Identity, DynamicObject>>,
    applied: Mutex<Vec<DynamicObject>>,
    deleted: Mutex<Vec<DynamicObject>>,
    status_updates: Mutex<Vec<(InstanceKey, HubClusterStatus)>>,
    fail_apply_kind: Mutex<Option<String>>,
    fail_get: AtomicBool,
    fail_status: AtomicBool,
}

impl FakeCluster {
    pub fn with_instance(instance: HubCluster) -> Self {
        let cluster = Self::default();
        cluster.insert(instance);
        cluster
    }

    pub fn insert(&self, instance: HubCluster) {
        let key = InstanceKey::for_instance(&instance);
        self.instances.lock().unwrap().insert(key, instance);
    }

    pub fn remove(&self, key: &InstanceKey) {
        self.instances.lock().unwrap().remove(key);
    }

    /// Make every apply of `kind` fail
    pub fn fail_applies_of(&self, kind: &str) {
        *self.fail_apply_kind.lock().unwrap() = Some(kind.to_string());
    }

    /// Make instance reads fail with a server error
    pub fn fail_get(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    /// Make status writes fail with a server error
    pub fn fail_status(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    /// Drop a stored object behind the operator's back
    pub fn forget(&self, identity: &Identity) {
        self.objects.lock().unwrap().remove(identity);
    }

    /// Current cluster contents
    pub fn objects(&self) -> BTreeMap<Identity, DynamicObject> {
        self.objects.lock().unwrap().clone()
    }

    /// Every apply call, in order
    pub fn applied(&self) -> Vec<DynamicObject> {
        self.applied.lock().unwrap().clone()
    }

    /// Every delete call, in order, whether or not the object existed
    pub fn deleted(&self) -> Vec<DynamicObject> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn status_updates(&self) -> Vec<(InstanceKey, HubClusterStatus)> {
        self.status_updates.lock().unwrap().clone()
    }

    pub fn instance(&self, key: &InstanceKey) -> Option<HubCluster> {
        self.instances.lock().unwrap().get(key).cloned()
    }
}

pub fn server_error() -> ClusterError {
    ClusterError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "etcdserver: request timed out".to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_instance(&self, key: &InstanceKey) -> Result<Option<HubCluster>, ClusterError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        Ok(self.instance(key))
    }

    async fn apply(&self, object: &DynamicObject) -> Result<(), ClusterError> {
        let kind = object
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_default();
        if self.fail_apply_kind.lock().unwrap().as_deref() == Some(kind.as_str()) {
            return Err(ClusterError::UnknownKind {
                api_version: "test/v1".to_string(),
                kind,
            });
        }
        self.applied.lock().unwrap().push(object.clone());
        self.objects
            .lock()
            .unwrap()
            .insert(identity(object), object.clone());
        Ok(())
    }

    async fn delete(&self, object: &DynamicObject) -> Result<bool, ClusterError> {
        self.deleted.lock().unwrap().push(object.clone());
        Ok(self.objects.lock().unwrap().remove(&identity(object)).is_some())
    }

    async fn update_status(
        &self,
        key: &InstanceKey,
        status: &HubClusterStatus,
    ) -> Result<(), ClusterError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        self.status_updates
            .lock()
            .unwrap()
            .push((key.clone(), status.clone()));
        if let Some(instance) = self.instances.lock().unwrap().get_mut(key) {
            instance.status = Some(status.clone());
        }
        Ok(())
    }
}

/// A persisted `HubCluster` (it has a uid, so an owner reference can be built)
pub fn hub(namespace: &str, name: &str) -> HubCluster {
    let mut hub = HubCluster::new(name, HubClusterSpec::default());
    hub.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("{namespace}-{name}-uid")),
        ..ObjectMeta::default()
    };
    hub
}

/// Write `contents` to `bundle.yaml` in a fresh temporary directory
pub fn manifest_dir(contents: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "bundle.yaml", contents);
    dir
}

pub fn write_file(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

pub fn store_for(dir: &TempDir) -> Arc<ManifestStore> {
    Arc::new(ManifestStore::load(ManifestSource::new(dir.path(), false)).unwrap())
}

pub fn identity(object: &DynamicObject) -> Identity {
    (
        object.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default(),
        object.metadata.namespace.clone(),
        object.metadata.name.clone().unwrap_or_default(),
    )
}
