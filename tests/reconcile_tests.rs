//! # Reconcile Tests
//!
//! End-to-end reconcile cycles against an in-memory cluster:
//! install, status recording, teardown, convergence and cancellation.

mod common;

use common::{hub, identity, manifest_dir, store_for, write_file, FakeCluster, BUNDLE, BUNDLE_LEN};
use hubcluster_operator::constants::{HUB_SYSTEM_NAMESPACE, OPERATOR_VERSION};
use hubcluster_operator::controller::reconciler::{
    reconcile, Outcome, Reconciler, ReconcilerError, ReconcilerSettings,
};
use hubcluster_operator::crd::InstanceKey;
use hubcluster_operator::runtime::error_policy::handle_reconciliation_error;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn reconciler(
    cluster: &Arc<FakeCluster>,
    dir: &tempfile::TempDir,
    settings: ReconcilerSettings,
) -> (Reconciler, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let reconciler = Reconciler::new(
        Arc::clone(cluster) as Arc<dyn hubcluster_operator::cluster::ClusterClient>,
        store_for(dir),
        settings,
        rx,
    );
    (reconciler, tx)
}

#[tokio::test]
async fn test_install_transforms_and_records_status() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");

    let outcome = reconciler.reconcile_key(&key).await.unwrap();
    assert_eq!(outcome, Outcome::Applied { resources: BUNDLE_LEN });

    let applied = cluster.applied();
    let identities: Vec<_> = applied.iter().map(identity).collect();
    assert_eq!(
        identities,
        vec![
            ("Namespace".to_string(), None, HUB_SYSTEM_NAMESPACE.to_string()),
            ("ServiceAccount".to_string(), Some("team-a".to_string()), "hub-agent".to_string()),
            ("ClusterRole".to_string(), None, "hub-agent".to_string()),
            ("RoleBinding".to_string(), Some("team-a".to_string()), "hub-agent".to_string()),
            ("ClusterRoleBinding".to_string(), None, "hub-agent".to_string()),
        ]
    );

    for object in &applied {
        let owners = object.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "HubCluster");
        assert_eq!(owners[0].name, "hub1");
        assert_eq!(owners[0].uid, "team-a-hub1-uid");
        assert_eq!(owners[0].controller, Some(true));
    }

    // Both bindings point their ServiceAccount subject at the instance namespace
    assert_eq!(applied[3].data["subjects"][0]["namespace"], "team-a");
    assert_eq!(applied[4].data["subjects"][0]["namespace"], "team-a");

    let updates = cluster.status_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, key);
    assert_eq!(updates[0].1.version.as_deref(), Some(OPERATOR_VERSION));
}

#[tokio::test]
async fn test_stored_manifest_is_not_mutated_by_install() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());

    reconciler
        .reconcile_key(&InstanceKey::new("team-a", "hub1"))
        .await
        .unwrap();

    let stored = reconciler.manifests().current();
    assert_eq!(stored.resources()[0].name(), "joined");
    assert_eq!(stored.resources()[1].namespace(), None);
    assert!(stored.resources()[1].metadata().owner_references.is_none());
}

#[tokio::test]
async fn test_two_instances_get_their_own_namespace() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    cluster.insert(hub("team-b", "hub2"));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());

    reconciler
        .reconcile_key(&InstanceKey::new("team-a", "hub1"))
        .await
        .unwrap();
    reconciler
        .reconcile_key(&InstanceKey::new("team-b", "hub2"))
        .await
        .unwrap();

    let applied = cluster.applied();
    assert_eq!(applied.len(), 2 * BUNDLE_LEN);
    assert_eq!(applied[1].metadata.namespace.as_deref(), Some("team-a"));
    assert_eq!(applied[BUNDLE_LEN + 1].metadata.namespace.as_deref(), Some("team-b"));
    assert_eq!(
        applied[BUNDLE_LEN + 3].data["subjects"][0]["namespace"],
        "team-b"
    );
}

#[tokio::test]
async fn test_namespace_override_replaces_instance_namespace() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let settings = ReconcilerSettings {
        namespace_override: Some("shared".to_string()),
        ..ReconcilerSettings::default()
    };
    let (reconciler, _tx) = reconciler(&cluster, &dir, settings);

    reconciler
        .reconcile_key(&InstanceKey::new("team-a", "hub1"))
        .await
        .unwrap();

    let applied = cluster.applied();
    assert_eq!(applied[1].metadata.namespace.as_deref(), Some("shared"));
    assert_eq!(applied[3].data["subjects"][0]["namespace"], "shared");
}

#[tokio::test]
async fn test_missing_instance_tears_down_in_reverse_order() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::default());
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());

    let outcome = reconciler
        .reconcile_key(&InstanceKey::new("team-a", "hub1"))
        .await
        .unwrap();
    // Nothing was ever applied, so every delete finds the object absent
    assert_eq!(outcome, Outcome::TornDown { deleted: 0 });

    let deleted: Vec<_> = cluster.deleted().iter().map(identity).collect();
    assert_eq!(
        deleted,
        vec![
            ("ClusterRoleBinding".to_string(), None, "hub-agent".to_string()),
            ("RoleBinding".to_string(), Some("team-a".to_string()), "hub-agent".to_string()),
            ("ClusterRole".to_string(), None, "hub-agent".to_string()),
            ("ServiceAccount".to_string(), Some("team-a".to_string()), "hub-agent".to_string()),
            ("Namespace".to_string(), None, HUB_SYSTEM_NAMESPACE.to_string()),
        ]
    );
    assert!(cluster.applied().is_empty());
    assert!(cluster.status_updates().is_empty());
}

#[tokio::test]
async fn test_install_then_delete_removes_what_was_applied() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");

    reconciler.reconcile_key(&key).await.unwrap();
    assert_eq!(cluster.objects().len(), BUNDLE_LEN);
    cluster.remove(&key);
    let outcome = reconciler.reconcile_key(&key).await.unwrap();

    assert_eq!(outcome, Outcome::TornDown { deleted: BUNDLE_LEN });
    assert!(cluster.objects().is_empty());
    let mut applied: Vec<_> = cluster.applied().iter().map(identity).collect();
    applied.reverse();
    let deleted: Vec<_> = cluster.deleted().iter().map(identity).collect();
    assert_eq!(applied, deleted);
}

#[tokio::test]
async fn test_converged_instance_skips_status_write() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");

    reconciler.reconcile_key(&key).await.unwrap();
    let converged = cluster.objects();
    reconciler.reconcile_key(&key).await.unwrap();

    // Applies are repeated but change nothing; the status write is not repeated
    assert_eq!(cluster.objects(), converged);
    assert_eq!(cluster.applied().len(), 2 * BUNDLE_LEN);
    assert_eq!(cluster.status_updates().len(), 1);
    assert_eq!(
        cluster.instance(&key).unwrap().status.unwrap().version.as_deref(),
        Some(OPERATOR_VERSION)
    );
}

#[tokio::test]
async fn test_apply_failure_skips_status() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    cluster.fail_applies_of("ClusterRole");
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());

    let err = reconciler
        .reconcile_key(&InstanceKey::new("team-a", "hub1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::Apply(_)), "got {err:?}");
    assert!(err.to_string().contains("ClusterRole/hub-agent"));
    // Namespace and ServiceAccount went out before the failure
    assert_eq!(cluster.applied().len(), 2);
    assert!(cluster.status_updates().is_empty());
}

#[tokio::test]
async fn test_instance_without_uid_fails_transform() {
    let dir = manifest_dir(BUNDLE);
    let mut instance = hub("team-a", "hub1");
    instance.metadata.uid = None;
    let cluster = Arc::new(FakeCluster::with_instance(instance));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());

    let err = reconciler
        .reconcile_key(&InstanceKey::new("team-a", "hub1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::Transform(_)), "got {err:?}");
    assert!(cluster.applied().is_empty());
}

#[tokio::test]
async fn test_shutdown_cancels_cycle() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    tx.send(true).unwrap();

    let err = reconciler
        .reconcile_key(&InstanceKey::new("team-a", "hub1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::Cancelled));
    assert!(cluster.applied().is_empty());
}

#[tokio::test]
async fn test_manifest_change_is_picked_up_on_next_cycle() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");

    reconciler.reconcile_key(&key).await.unwrap();
    write_file(
        dir.path(),
        "extra.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: extra\n",
    );
    // The cycle above reparsed before the file existed; this one reparses it in
    reconciler.reconcile_key(&key).await.unwrap();
    let outcome = reconciler.reconcile_key(&key).await.unwrap();

    assert_eq!(outcome, Outcome::Applied { resources: BUNDLE_LEN + 1 });
}

#[tokio::test]
async fn test_broken_manifest_keeps_previous_version() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");

    write_file(dir.path(), "bundle.yaml", "kind: [unclosed\n");
    reconciler.reconcile_key(&key).await.unwrap();
    let outcome = reconciler.reconcile_key(&key).await.unwrap();

    assert_eq!(outcome, Outcome::Applied { resources: BUNDLE_LEN });
}

#[tokio::test]
async fn test_reconcile_entry_point_requeue_policy() {
    let dir = manifest_dir(BUNDLE);
    let instance = hub("team-a", "hub1");
    let cluster = Arc::new(FakeCluster::with_instance(instance.clone()));

    let (reconciler_default, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let action = reconcile(Arc::new(instance.clone()), Arc::new(reconciler_default))
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());

    let settings = ReconcilerSettings {
        resync_interval: Some(Duration::from_secs(600)),
        ..ReconcilerSettings::default()
    };
    let (reconciler_resync, _tx) = reconciler(&cluster, &dir, settings);
    let action = reconcile(Arc::new(instance), Arc::new(reconciler_resync))
        .await
        .unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(600)));
}

#[tokio::test]
async fn test_error_policy_backs_off_and_success_resets() {
    let dir = manifest_dir(BUNDLE);
    let instance = hub("team-a", "hub1");
    let cluster = Arc::new(FakeCluster::with_instance(instance.clone()));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let ctx = Arc::new(reconciler);
    let obj = Arc::new(instance);
    let err = ReconcilerError::Cancelled;

    assert_eq!(
        handle_reconciliation_error(Arc::clone(&obj), &err, Arc::clone(&ctx)),
        Action::await_change()
    );

    let err = ReconcilerError::StatusUpdate(hubcluster_operator::cluster::ClusterError::MissingField(
        "status",
    ));
    let first = handle_reconciliation_error(Arc::clone(&obj), &err, Arc::clone(&ctx));
    let second = handle_reconciliation_error(Arc::clone(&obj), &err, Arc::clone(&ctx));
    assert_eq!(first, Action::requeue(Duration::from_secs(5)));
    assert_eq!(second, Action::requeue(Duration::from_secs(5)));
    assert_eq!(ctx.backoff_states.lock().unwrap().len(), 1);

    reconcile(Arc::clone(&obj), Arc::clone(&ctx)).await.unwrap();
    assert!(ctx.backoff_states.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_teardown_skips_objects_already_gone() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");

    reconciler.reconcile_key(&key).await.unwrap();
    cluster.forget(&(
        "ServiceAccount".to_string(),
        Some("team-a".to_string()),
        "hub-agent".to_string(),
    ));
    cluster.remove(&key);

    let outcome = reconciler.reconcile_key(&key).await.unwrap();
    assert_eq!(outcome, Outcome::TornDown { deleted: BUNDLE_LEN - 1 });
    assert_eq!(cluster.deleted().len(), BUNDLE_LEN);
    assert!(cluster.objects().is_empty());
}

#[tokio::test]
async fn test_fetch_error_is_surfaced_without_teardown() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");

    reconciler.reconcile_key(&key).await.unwrap();
    cluster.fail_get();
    let err = reconciler.reconcile_key(&key).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Fetch(_)), "got {err:?}");
    assert!(cluster.deleted().is_empty());
    assert_eq!(cluster.objects().len(), BUNDLE_LEN);
    assert_eq!(cluster.applied().len(), BUNDLE_LEN);
}

#[tokio::test]
async fn test_status_error_fails_cycle_before_refresh() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    cluster.fail_status();
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");
    write_file(
        dir.path(),
        "extra.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: extra\n",
    );

    let err = reconciler.reconcile_key(&key).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::StatusUpdate(_)), "got {err:?}");
    assert!(cluster.instance(&key).unwrap().status.is_none());
    assert!(cluster.status_updates().is_empty());
    // The refresh stage never ran
    assert_eq!(reconciler.manifests().current().len(), BUNDLE_LEN);
}

#[tokio::test]
async fn test_key_lock_released_after_teardown() {
    let dir = manifest_dir(BUNDLE);
    let cluster = Arc::new(FakeCluster::with_instance(hub("team-a", "hub1")));
    let (reconciler, _tx) = reconciler(&cluster, &dir, ReconcilerSettings::default());
    let key = InstanceKey::new("team-a", "hub1");

    reconciler.reconcile_key(&key).await.unwrap();
    assert_eq!(reconciler.key_locks.lock().unwrap().len(), 1);

    cluster.remove(&key);
    reconciler.reconcile_key(&key).await.unwrap();
    assert!(reconciler.key_locks.lock().unwrap().is_empty());
}
