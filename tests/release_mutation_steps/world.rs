//! Shared world state for release mutation BDD scenarios.

use std::sync::Arc;

use harbormaster::config::TaskSettings;
use harbormaster::release::{
    adapters::memory::{
        InMemoryCacheStore, InMemoryChartManager, InMemoryReleaseConfigSource, InMemoryTaskBroker,
    },
    domain::TaskSignature,
    services::{ReleaseService, ReleaseServiceError},
};
use mockable::DefaultClock;
use rstest::fixture;

/// Service type used by the BDD world.
pub type TestReleaseService = ReleaseService<
    InMemoryCacheStore,
    InMemoryTaskBroker<DefaultClock>,
    InMemoryChartManager,
    InMemoryReleaseConfigSource,
    DefaultClock,
>;

/// Scenario world for release mutation behaviour tests.
pub struct ReleaseMutationWorld {
    pub service: TestReleaseService,
    pub last_timeout_secs: Option<u64>,
    pub last_result: Option<Result<Option<TaskSignature>, ReleaseServiceError>>,
}

impl ReleaseMutationWorld {
    /// Creates a world whose broker never runs tasks, so every dispatched
    /// task stays pending.
    #[must_use]
    pub fn new() -> Self {
        let clock = Arc::new(DefaultClock);
        let configs = Arc::new(InMemoryReleaseConfigSource::new());
        let service = ReleaseService::new(
            Arc::new(InMemoryCacheStore::new()),
            Arc::new(InMemoryTaskBroker::new(Arc::clone(&clock))),
            Arc::new(InMemoryChartManager::with_release_configs(
                configs.as_ref().clone(),
            )),
            configs,
            clock,
            TaskSettings::default(),
        );

        Self {
            service,
            last_timeout_secs: None,
            last_result: None,
        }
    }
}

impl Default for ReleaseMutationWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ReleaseMutationWorld {
    ReleaseMutationWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
