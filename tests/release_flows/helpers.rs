//! Shared test helpers for in-memory release flow tests.

use std::sync::Arc;
use std::time::Duration;

use harbormaster::config::{ControllerSettings, TaskSettings};
use harbormaster::release::{
    adapters::memory::{
        InMemoryCacheStore, InMemoryChartManager, InMemoryReleaseConfigSource, InMemoryTaskBroker,
        RecordingEventPublisher,
    },
    domain::ConfigValues,
    services::{DependencyReconciliationController, ReleaseService, ResyncService},
};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Release service over in-memory adapters.
pub type TestService = ReleaseService<
    InMemoryCacheStore,
    InMemoryTaskBroker<DefaultClock>,
    InMemoryChartManager,
    InMemoryReleaseConfigSource,
    DefaultClock,
>;

/// Controller reloading through [`TestService`].
pub type TestController = DependencyReconciliationController<
    InMemoryReleaseConfigSource,
    TestService,
    RecordingEventPublisher,
>;

/// Fully wired in-memory stack.
pub struct Stack {
    pub store: Arc<InMemoryCacheStore>,
    pub broker: Arc<InMemoryTaskBroker<DefaultClock>>,
    pub charts: Arc<InMemoryChartManager>,
    pub configs: Arc<InMemoryReleaseConfigSource>,
    pub publisher: Arc<RecordingEventPublisher>,
    pub service: Arc<TestService>,
    pub cancel: CancellationToken,
    workers: Option<JoinHandle<()>>,
}

impl Stack {
    /// Starts the broker workers.
    ///
    /// # Panics
    ///
    /// Panics when the workers were already started.
    pub fn start_workers(&mut self) {
        let handle = self
            .broker
            .start(self.service.task_registry(), 8, self.cancel.clone())
            .expect("broker workers start");
        self.workers = Some(handle);
    }

    /// Spawns a dependency controller reloading through the service.
    pub fn spawn_controller(&self) -> JoinHandle<()> {
        let controller = Arc::new(DependencyReconciliationController::new(
            Arc::clone(&self.configs),
            Arc::clone(&self.service),
            Arc::clone(&self.publisher),
            ControllerSettings {
                retry_reload_delay_secs: 1,
                ..ControllerSettings::default()
            },
        ));
        tokio::spawn(controller.run(self.cancel.clone()))
    }

    /// Builds a resync service over the stack's adapters.
    #[must_use]
    pub fn resync(
        &self,
    ) -> ResyncService<
        InMemoryCacheStore,
        InMemoryTaskBroker<DefaultClock>,
        InMemoryChartManager,
        InMemoryReleaseConfigSource,
        DefaultClock,
    > {
        ResyncService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.broker),
            Arc::clone(&self.charts),
            Arc::clone(&self.configs),
            Arc::new(DefaultClock),
            Duration::ZERO,
        )
    }

    /// Stops workers and background tasks.
    pub async fn shut_down(mut self) {
        self.cancel.cancel();
        if let Some(workers) = self.workers.take() {
            workers.await.expect("broker dispatch loop joins");
        }
    }
}

/// Provides a fresh stack whose broker workers are not yet started.
#[fixture]
pub fn stack() -> Stack {
    let store = Arc::new(InMemoryCacheStore::new());
    let clock = Arc::new(DefaultClock);
    let broker = Arc::new(InMemoryTaskBroker::new(Arc::clone(&clock)));
    let configs = Arc::new(InMemoryReleaseConfigSource::new());
    let charts = Arc::new(InMemoryChartManager::with_release_configs(
        configs.as_ref().clone(),
    ));
    let service = Arc::new(ReleaseService::new(
        Arc::clone(&store),
        Arc::clone(&broker),
        Arc::clone(&charts),
        Arc::clone(&configs),
        clock,
        TaskSettings::default(),
    ));
    Stack {
        store,
        broker,
        charts,
        configs,
        publisher: Arc::new(RecordingEventPublisher::new()),
        service,
        cancel: CancellationToken::new(),
        workers: None,
    }
}

/// Builds a config value object from a JSON literal.
///
/// # Panics
///
/// Panics when `value` is not an object.
#[must_use]
pub fn values(value: Value) -> ConfigValues {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Polls `check` every 50ms until it holds or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
