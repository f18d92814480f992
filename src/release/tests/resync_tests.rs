//! Read-cache resync tests: convergence, idempotence, and live-task gating.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::support::{Harness, revision};
use crate::release::{
    domain::{
        PROJECT_NAME_LABEL, ProjectTask, ReleaseConfig, ReleaseKey, ReleaseTask, TaskRecord,
        TaskSignature,
    },
    ports::TaskBroker,
    services::{ResyncError, ResyncService},
};

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

fn key(name: &str) -> ReleaseKey {
    ReleaseKey::new("prod", name).expect("valid key")
}

async fn cached_names(harness: &Harness) -> Vec<String> {
    let mut names: Vec<String> = harness
        .state_cache()
        .list_release_caches(None)
        .await
        .expect("list succeeds")
        .into_iter()
        .map(|release| release.name)
        .collect();
    names.sort();
    names
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resync_caches_the_latest_revision_with_a_task_placeholder(harness: Harness) {
    harness
        .charts
        .insert_revision(revision("prod", "web", 1))
        .expect("revision recorded");
    harness
        .charts
        .insert_revision(revision("prod", "web", 2))
        .expect("revision recorded");

    let report = harness
        .resync()
        .resync(&CancellationToken::new())
        .await
        .expect("resync succeeds");

    assert_eq!(report.releases_set, 1);
    assert_eq!(report.tasks_set, 1);
    let cached = harness
        .state_cache()
        .get_release_cache(&key("web"))
        .await
        .expect("release cached");
    assert_eq!(cached.version, 2);
    let task = harness
        .state_cache()
        .get_release_task(&key("web"))
        .await
        .expect("placeholder written");
    assert!(task.latest_signature().is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_resync_without_changes_writes_nothing(harness: Harness) {
    harness
        .charts
        .insert_revision(revision("prod", "web", 1))
        .expect("revision recorded");
    harness
        .configs
        .upsert(ReleaseConfig::new("prod", "web").with_label(PROJECT_NAME_LABEL, "shop"))
        .expect("config recorded");
    let resync = harness.resync();
    let cancel = CancellationToken::new();
    resync.resync(&cancel).await.expect("first resync succeeds");
    let writes_before = harness.store.write_count();

    let report = resync.resync(&cancel).await.expect("second resync succeeds");

    assert_eq!(report.total_writes(), 0);
    assert_eq!(harness.store.write_count(), writes_before);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resync_converges_the_cache_to_ground_truth(harness: Harness) {
    let cache = harness.state_cache();
    for name in ["a", "c"] {
        cache
            .set_release_cache(&revision("prod", name, 1))
            .await
            .expect("seeded");
        cache
            .set_release_task(&ReleaseTask::placeholder(&key(name)))
            .await
            .expect("seeded");
    }
    for name in ["a", "b"] {
        harness
            .charts
            .insert_revision(revision("prod", name, 1))
            .expect("revision recorded");
    }

    let report = harness
        .resync()
        .resync(&CancellationToken::new())
        .await
        .expect("resync succeeds");

    assert_eq!(cached_names(&harness).await, vec!["a", "b"]);
    assert_eq!(report.releases_set, 1);
    assert_eq!(report.releases_deleted, 1);
    assert_eq!(report.tasks_set, 1);
    assert_eq!(report.tasks_deleted, 1, "idle placeholder for c is removed");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_task_record_survives_while_its_task_is_live(harness: Harness) {
    let signature = TaskSignature::new("Delete-Release-Task", "{}", 30);
    harness
        .broker
        .reserve(&signature)
        .await
        .expect("reservation recorded");
    harness
        .state_cache()
        .set_release_task(&ReleaseTask::with_signature(&key("gone"), signature))
        .await
        .expect("seeded");
    let resync = harness.resync();
    let cancel = CancellationToken::new();

    let live = resync.resync(&cancel).await.expect("resync succeeds");
    assert_eq!(live.tasks_deleted, 0);
    assert!(
        harness
            .state_cache()
            .get_release_task(&key("gone"))
            .await
            .is_ok()
    );

    harness.clock.advance(TimeDelta::seconds(31));
    let expired = resync.resync(&cancel).await.expect("resync succeeds");
    assert_eq!(expired.tasks_deleted, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn projects_follow_labelled_release_configs(harness: Harness) {
    harness
        .configs
        .upsert(ReleaseConfig::new("prod", "web").with_label(PROJECT_NAME_LABEL, "shop"))
        .expect("config recorded");
    harness
        .state_cache()
        .set_project_task(&ProjectTask::placeholder("prod", "retired"))
        .await
        .expect("seeded");

    let report = harness
        .resync()
        .resync(&CancellationToken::new())
        .await
        .expect("resync succeeds");

    assert_eq!(report.projects_set, 1);
    assert_eq!(report.projects_deleted, 1);
    let projects = harness
        .state_cache()
        .list_project_tasks(Some("prod"))
        .await
        .expect("list succeeds");
    assert_eq!(projects, vec![ProjectTask::placeholder("prod", "shop")]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn conflicting_transactions_are_retried(harness: Harness) {
    harness
        .charts
        .insert_revision(revision("prod", "web", 1))
        .expect("revision recorded");
    harness.store.inject_conflicts(2);

    let report = harness
        .resync()
        .resync(&CancellationToken::new())
        .await
        .expect("resync succeeds");

    assert_eq!(report.attempts, 3);
    assert_eq!(cached_names(&harness).await, vec!["web"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancellation_interrupts_the_conflict_backoff(harness: Harness) {
    harness
        .charts
        .insert_revision(revision("prod", "web", 1))
        .expect("revision recorded");
    harness.store.inject_conflicts(1);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let resync = ResyncService::new(
        Arc::clone(&harness.store),
        Arc::clone(&harness.broker),
        Arc::clone(&harness.charts),
        Arc::clone(&harness.configs),
        Arc::clone(&harness.clock),
        Duration::from_secs(60),
    );

    let err = resync
        .resync(&cancel)
        .await
        .expect_err("cancelled while backing off");

    assert!(matches!(err, ResyncError::Cancelled));
}
