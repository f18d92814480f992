//! Shared fixtures: a manually advanced clock and a fully wired in-memory
//! service stack.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TaskSettings;
use crate::release::{
    adapters::memory::{
        InMemoryCacheStore, InMemoryChartManager, InMemoryReleaseConfigSource, InMemoryTaskBroker,
    },
    domain::{ConfigValues, ReleaseCache},
    services::{ReleaseService, ResyncService, StateCache},
};

/// Clock that only moves when told to.
#[derive(Debug)]
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn new() -> Self {
        Self {
            now: Mutex::new(
                DateTime::from_timestamp(1_767_225_600, 0).expect("valid fixed timestamp"),
            ),
        }
    }

    pub(super) fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

pub(super) type TestBroker = InMemoryTaskBroker<ManualClock>;

pub(super) type TestService = ReleaseService<
    InMemoryCacheStore,
    TestBroker,
    InMemoryChartManager,
    InMemoryReleaseConfigSource,
    ManualClock,
>;

pub(super) type TestResync = ResyncService<
    InMemoryCacheStore,
    TestBroker,
    InMemoryChartManager,
    InMemoryReleaseConfigSource,
    ManualClock,
>;

/// In-memory adapters wired to one release service.
pub(super) struct Harness {
    pub(super) store: Arc<InMemoryCacheStore>,
    pub(super) broker: Arc<TestBroker>,
    pub(super) charts: Arc<InMemoryChartManager>,
    pub(super) configs: Arc<InMemoryReleaseConfigSource>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) service: Arc<TestService>,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_settings(TaskSettings::default())
    }

    pub(super) fn with_settings(settings: TaskSettings) -> Self {
        let store = Arc::new(InMemoryCacheStore::new());
        let clock = Arc::new(ManualClock::new());
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
            Arc::clone(&clock),
            settings,
        ));
        Self {
            store,
            broker,
            charts,
            configs,
            clock,
            service,
        }
    }

    /// Starts the broker workers; tasks stay pending until this is called.
    pub(super) fn start_workers(&self, cancel: &CancellationToken) -> JoinHandle<()> {
        self.broker
            .start(self.service.task_registry(), 4, cancel.clone())
            .expect("broker workers start")
    }

    pub(super) fn state_cache(&self) -> StateCache<InMemoryCacheStore> {
        StateCache::new(Arc::clone(&self.store))
    }

    pub(super) fn resync(&self) -> TestResync {
        ResyncService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.broker),
            Arc::clone(&self.charts),
            Arc::clone(&self.configs),
            Arc::clone(&self.clock),
            Duration::ZERO,
        )
    }
}

/// Builds a config value object from a JSON literal.
pub(super) fn values(value: Value) -> ConfigValues {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Builds a rendered revision as the chart manager would report it.
pub(super) fn revision(namespace: &str, name: &str, version: u32) -> ReleaseCache {
    ReleaseCache {
        namespace: namespace.to_owned(),
        name: name.to_owned(),
        version,
        chart_name: "nginx".to_owned(),
        chart_version: "1.0.0".to_owned(),
        config_values: values(json!({ "replicas": version })),
        ..ReleaseCache::default()
    }
}
