//! Output-config propagation from a release to its dependents.

use std::time::Duration;

use harbormaster::release::{
    domain::{ReleaseConfigDeltaEventType, ReleaseKey, ReleaseRequest},
    services::ReleaseReloader,
};
use rstest::rstest;
use serde_json::json;

use super::helpers::{Stack, eventually, stack, values};

const PROPAGATION_LIMIT: Duration = Duration::from_secs(20);

fn key(name: &str) -> ReleaseKey {
    ReleaseKey::new("prod", name).expect("valid key")
}

fn database(host: &str) -> ReleaseRequest {
    ReleaseRequest::new("db", "postgres").with_config_values(values(json!({ "host": host })))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn upgraded_dependency_reloads_its_dependent(mut stack: Stack) {
    stack.start_workers();
    let controller = stack.spawn_controller();
    let service = &stack.service;

    service
        .install_upgrade("prod", database("a"), false, 30)
        .await
        .expect("db installed");
    service
        .install_upgrade(
            "prod",
            ReleaseRequest::new("app", "web").with_dependency("database", "db"),
            false,
            30,
        )
        .await
        .expect("app installed");

    service
        .install_upgrade_with_retry("prod", database("b"), false, 30)
        .await
        .expect("db upgraded");

    let expected = &values(json!({"database": {"host": "b"}}));
    let propagated = eventually(PROPAGATION_LIMIT, move || async move {
        service
            .get_release(&key("app"))
            .await
            .is_ok_and(|app| app.dependencies_config_values == *expected)
    })
    .await;
    assert!(propagated, "app should be reloaded with the new db output");

    let publisher = &stack.publisher;
    let published = eventually(PROPAGATION_LIMIT, move || async move {
        publisher.events().iter().any(|event| {
            event.event_type == ReleaseConfigDeltaEventType::CreateOrUpdate
                && event.data.name == "db"
                && event.data.output_config == Some(values(json!({"host": "b"})))
        })
    })
    .await;
    assert!(published, "db change should be published");

    stack.cancel.cancel();
    controller.await.expect("controller joins");
    stack.shut_down().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deleted_release_is_published_as_a_delete(mut stack: Stack) {
    stack.start_workers();
    let controller = stack.spawn_controller();
    stack
        .service
        .install_upgrade("prod", database("a"), false, 30)
        .await
        .expect("db installed");

    stack
        .service
        .delete_with_retry("prod", "db", false, 30, false)
        .await
        .expect("db deleted");

    let publisher = &stack.publisher;
    let published = eventually(PROPAGATION_LIMIT, move || async move {
        publisher.events().iter().any(|event| {
            event.event_type == ReleaseConfigDeltaEventType::Delete && event.data.name == "db"
        })
    })
    .await;
    assert!(published, "deletion should be published");
    let exists = stack
        .service
        .release_exists(&key("db"))
        .await
        .expect("lookup succeeds");
    assert!(!exists);

    stack.cancel.cancel();
    controller.await.expect("controller joins");
    stack.shut_down().await;
}
