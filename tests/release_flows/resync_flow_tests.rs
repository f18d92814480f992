//! Read-cache healing from the chart manager.

use std::sync::Arc;
use std::time::Duration;

use harbormaster::release::{
    domain::{ReleaseCache, ReleaseKey, ReleaseRequest},
    services::StateCache,
};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

use super::helpers::{Stack, eventually, stack};

fn key(name: &str) -> ReleaseKey {
    ReleaseKey::new("prod", name).expect("valid key")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resync_restores_a_wiped_read_cache(mut stack: Stack) {
    stack.start_workers();
    stack
        .service
        .install_upgrade("prod", ReleaseRequest::new("web", "nginx"), false, 30)
        .await
        .expect("web installed");
    let cache = StateCache::new(Arc::clone(&stack.store));
    cache
        .delete_release_cache(&key("web"))
        .await
        .expect("cache entry removed");
    cache
        .delete_release_task(&key("web"))
        .await
        .expect("task entry removed");

    let resync = stack.resync();
    let cancel = CancellationToken::new();
    let healed = resync.resync(&cancel).await.expect("resync succeeds");
    let repeated = resync.resync(&cancel).await.expect("resync succeeds");

    assert_eq!(healed.releases_set, 1);
    assert_eq!(healed.tasks_set, 1);
    assert_eq!(repeated.total_writes(), 0);
    let restored = stack
        .service
        .get_release(&key("web"))
        .await
        .expect("release restored");
    assert_eq!(restored.version, 1);
    stack.shut_down().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn periodic_resync_picks_up_releases_until_cancelled(stack: Stack) {
    let resync = stack.resync();
    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        resync.run(Duration::from_millis(20), &loop_cancel).await;
    });

    stack
        .charts
        .insert_revision(ReleaseCache {
            namespace: "prod".to_owned(),
            name: "legacy".to_owned(),
            version: 3,
            chart_name: "nginx".to_owned(),
            ..ReleaseCache::default()
        })
        .expect("revision recorded");
    let service = &stack.service;
    let cached = eventually(Duration::from_secs(5), move || async move {
        service
            .get_release(&key("legacy"))
            .await
            .is_ok_and(|release| release.version == 3)
    })
    .await;
    assert!(cached, "periodic resync should cache the release");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("resync loop stops promptly")
        .expect("resync loop joins");
}
