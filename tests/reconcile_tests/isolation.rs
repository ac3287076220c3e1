//! Stories about failures, stale writes and independence between Simples

use std::time::Duration;

use simple_operator::controller::Requeue;
use simple_operator::workload::{labels_for_simple, replicas_of};

use super::store::{conflict, unavailable, Call, FakeStore};

const NS: &str = "default";

/// Story: an event arrives for a Simple that no longer exists.
#[tokio::test]
async fn story_unknown_key_is_a_no_op() {
    let store = FakeStore::new();

    let requeue = store.reconcile(NS, "ghost").await.expect("not an error");
    assert_eq!(requeue, Requeue::None);
    assert_eq!(
        store.take_calls(),
        vec![Call::GetSimple(NS.into(), "ghost".into())]
    );
    assert_eq!(store.deployment_count(), 0);
}

/// Story: reconciling one Simple only ever touches that Simple's records.
#[tokio::test]
async fn story_no_cross_key_interference() {
    let store = FakeStore::new();
    store.add_simple(NS, "alpha", 1);
    store.add_simple(NS, "beta", 2);
    store.add_simple("other", "alpha", 3);
    store.reconcile(NS, "beta").await.unwrap();
    store.materialize_pods(NS, "beta");
    store.take_calls();

    for _ in 0..4 {
        store.reconcile(NS, "alpha").await.unwrap();
        store.materialize_pods(NS, "alpha");
    }

    for call in store.take_calls() {
        match call {
            Call::GetSimple(ns, name)
            | Call::GetDeployment(ns, name)
            | Call::CreateDeployment(ns, name)
            | Call::UpdateDeployment(ns, name)
            | Call::UpdateStatus(ns, name) => {
                assert_eq!((ns.as_str(), name.as_str()), (NS, "alpha"));
            }
            Call::ListPods(ns, labels) => {
                assert_eq!(ns, NS);
                assert_eq!(labels, labels_for_simple("alpha"));
            }
        }
    }

    assert_eq!(store.simple(NS, "alpha").unwrap().nodes(), ["alpha-0".to_string()]);
    assert!(store.simple(NS, "beta").unwrap().nodes().is_empty());
    assert!(store.simple("other", "alpha").unwrap().nodes().is_empty());
    assert!(store.deployment("other", "alpha").is_none());
    assert_eq!(replicas_of(&store.deployment(NS, "beta").unwrap()), 2);
}

/// Story: the API server is briefly unavailable. The pass fails without writing,
/// and the retry picks up where the failed pass stopped.
#[tokio::test]
async fn story_transient_failure_then_recovery() {
    let store = FakeStore::new();
    store.add_simple(NS, "web", 2);

    store.fail_next(unavailable());
    let err = store.reconcile(NS, "web").await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(store.deployment_count(), 0);

    assert_eq!(store.reconcile(NS, "web").await.unwrap(), Requeue::Now);
    assert_eq!(store.deployment_count(), 1);
}

/// Story: someone else updated the Deployment between the pass's read and its
/// resize. The pass fails with a conflict and the next pass resizes from fresh state.
#[tokio::test]
async fn story_stale_deployment_write_conflicts_then_resolves() {
    let store = FakeStore::new();
    store.add_simple(NS, "web", 1);
    store.reconcile(NS, "web").await.unwrap();
    store.set_size(NS, "web", 4);

    store.race_next_update();
    let err = store.reconcile(NS, "web").await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(replicas_of(&store.deployment(NS, "web").unwrap()), 1);

    let requeue = store.reconcile(NS, "web").await.unwrap();
    assert_eq!(requeue, Requeue::After(Duration::from_secs(60)));
    assert_eq!(replicas_of(&store.deployment(NS, "web").unwrap()), 4);
}

/// Story: the API server rejects the resize with a conflict outright.
#[tokio::test]
async fn story_injected_resize_conflict_surfaces() {
    let store = FakeStore::new();
    store.add_simple(NS, "web", 2);
    store.reconcile(NS, "web").await.unwrap();
    store.set_size(NS, "web", 3);

    store.fail_next_write(conflict());
    let err = store.reconcile(NS, "web").await.unwrap_err();
    assert!(err.is_conflict());

    assert!(matches!(
        store.reconcile(NS, "web").await.unwrap(),
        Requeue::After(_)
    ));
    assert_eq!(replicas_of(&store.deployment(NS, "web").unwrap()), 3);
}

/// Story: the Simple changed after the pass read it, so the status write
/// is rejected instead of clobbering the newer object.
#[tokio::test]
async fn story_stale_status_write_conflicts_then_resolves() {
    let store = FakeStore::new();
    store.add_simple(NS, "web", 2);
    store.reconcile(NS, "web").await.unwrap();
    store.materialize_pods(NS, "web");

    store.race_next_update();
    let err = store.reconcile(NS, "web").await.unwrap_err();
    assert!(err.is_conflict());
    assert!(store.simple(NS, "web").unwrap().nodes().is_empty());

    assert_eq!(store.reconcile(NS, "web").await.unwrap(), Requeue::None);
    assert_eq!(store.simple(NS, "web").unwrap().nodes().len(), 2);
}

/// Story: creation fails half-way through a pass. Nothing is left behind,
/// no status is written, and the next pass creates the Deployment.
#[tokio::test]
async fn story_create_failure_leaves_no_partial_state() {
    let store = FakeStore::new();
    store.add_simple(NS, "web", 1);

    store.fail_next_write(unavailable());
    assert!(store.reconcile(NS, "web").await.is_err());
    assert_eq!(store.deployment_count(), 0);
    assert!(!store
        .take_calls()
        .iter()
        .any(|c| matches!(c, Call::ListPods(..) | Call::UpdateStatus(..))));

    assert_eq!(store.reconcile(NS, "web").await.unwrap(), Requeue::Now);
    assert_eq!(store.deployment_count(), 1);
}

/// Story: the status write fails after pods were listed. The Deployment is
/// untouched and a later pass records the pods.
#[tokio::test]
async fn story_status_failure_is_retried_by_next_pass() {
    let store = FakeStore::new();
    store.add_simple(NS, "web", 2);
    store.reconcile(NS, "web").await.unwrap();
    store.materialize_pods(NS, "web");

    store.fail_next_write(unavailable());
    assert!(store.reconcile(NS, "web").await.is_err());
    assert!(store.simple(NS, "web").unwrap().nodes().is_empty());

    assert_eq!(store.reconcile(NS, "web").await.unwrap(), Requeue::None);
    assert_eq!(store.simple(NS, "web").unwrap().nodes().len(), 2);
    assert_eq!(replicas_of(&store.deployment(NS, "web").unwrap()), 2);
}

/// Story: an event storm delivers the same key many times. Only one Deployment
/// ever exists, and a create racing an existing object is rejected.
#[tokio::test]
async fn story_at_most_one_deployment_per_simple() {
    let store = FakeStore::new();
    store.add_simple(NS, "web", 1);

    for _ in 0..5 {
        store.reconcile(NS, "web").await.unwrap();
    }
    assert_eq!(store.deployment_count(), 1);

    let existing = store.deployment(NS, "web").unwrap();
    let err = simple_operator::controller::KubeClient::create_deployment(&store, &existing)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(store.deployment_count(), 1);
}
