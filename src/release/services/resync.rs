//! Transactional reconciliation of the read cache against ground truth.

use mockable::Clock;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::release::{
    domain::{
        ProjectTask, ReleaseCache, ReleaseConfig, ReleaseDomainError, ReleaseTask, TaskRecord,
        is_finished_or_timeout,
    },
    ports::{
        BrokerError, CacheMap, CacheStore, CacheStoreError, CacheWrite, ChartManager,
        ChartManagerError, ReleaseConfigSource, ReleaseConfigSourceError, TaskBroker, WatchKey,
    },
};

/// Errors returned by [`ResyncService`].
#[derive(Debug, Error)]
pub enum ResyncError {
    /// Listing releases failed.
    #[error(transparent)]
    Chart(#[from] ChartManagerError),

    /// Listing dependency-declaring resources failed.
    #[error(transparent)]
    Source(#[from] ReleaseConfigSourceError),

    /// Store failure other than a transaction conflict.
    #[error(transparent)]
    Store(#[from] CacheStoreError),

    /// Polling a task state for the idle check failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Ground truth holds a malformed release identity.
    #[error(transparent)]
    Domain(#[from] ReleaseDomainError),

    /// A record could not be encoded.
    #[error("failed to encode cache record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller cancelled the resync.
    #[error("resync cancelled")]
    Cancelled,
}

/// Result type for [`ResyncService`] operations.
pub type ResyncResult<T> = Result<T, ResyncError>;

/// Counts of the writes one committed resync applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncReport {
    /// Release cache records written.
    pub releases_set: usize,
    /// Release cache records removed.
    pub releases_deleted: usize,
    /// Release task placeholders written.
    pub tasks_set: usize,
    /// Idle release task records removed.
    pub tasks_deleted: usize,
    /// Project placeholders written.
    pub projects_set: usize,
    /// Idle project records removed.
    pub projects_deleted: usize,
    /// Transaction attempts, including the committed one.
    pub attempts: u32,
}

impl ResyncReport {
    /// Returns the total number of writes.
    #[must_use]
    pub const fn total_writes(&self) -> usize {
        self.releases_set
            + self.releases_deleted
            + self.tasks_set
            + self.tasks_deleted
            + self.projects_set
            + self.projects_deleted
    }
}

/// Heals the read cache from the chart manager and the dependency-declaring
/// resources.
///
/// Release cache records follow ground truth exactly. Task and project
/// records are created as placeholders when missing, never overwritten, and
/// removed only once their latest signature is finished or timed out.
pub struct ResyncService<S, B, M, R, C>
where
    S: CacheStore,
    B: TaskBroker,
    M: ChartManager,
    R: ReleaseConfigSource,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    broker: Arc<B>,
    charts: Arc<M>,
    configs: Arc<R>,
    clock: Arc<C>,
    conflict_backoff: Duration,
}

#[derive(Debug, Default)]
struct Target {
    releases: BTreeMap<String, ReleaseCache>,
    projects: BTreeMap<String, ProjectTask>,
}

fn latest_revisions(releases: Vec<ReleaseCache>) -> BTreeMap<String, ReleaseCache> {
    let mut latest: BTreeMap<String, ReleaseCache> = BTreeMap::new();
    for release in releases {
        let field = release.field_name();
        let newer = latest
            .get(&field)
            .is_none_or(|current| release.version > current.version);
        if newer {
            latest.insert(field, release);
        }
    }
    latest
}

fn project_targets(configs: &[ReleaseConfig]) -> BTreeMap<String, ProjectTask> {
    configs
        .iter()
        .filter_map(|config| {
            config
                .project_name()
                .filter(|project| !project.is_empty())
                .map(|project| ProjectTask::placeholder(config.namespace.clone(), project))
        })
        .map(|project| (project.field_name(), project))
        .collect()
}

impl<S, B, M, R, C> ResyncService<S, B, M, R, C>
where
    S: CacheStore,
    B: TaskBroker,
    M: ChartManager,
    R: ReleaseConfigSource,
    C: Clock + Send + Sync,
{
    /// Creates a resync service.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        broker: Arc<B>,
        charts: Arc<M>,
        configs: Arc<R>,
        clock: Arc<C>,
        conflict_backoff: Duration,
    ) -> Self {
        Self {
            store,
            broker,
            charts,
            configs,
            clock,
            conflict_backoff,
        }
    }

    /// Runs one resync, retrying transaction conflicts after the backoff
    /// until the transaction commits or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`ResyncError::Cancelled`] when cancelled while backing off and
    /// any non-conflict failure immediately.
    pub async fn resync(&self, cancel: &CancellationToken) -> ResyncResult<ResyncReport> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.resync_once().await {
                Ok(report) => {
                    return Ok(ResyncReport { attempts, ..report });
                }
                Err(ResyncError::Store(err)) if err.is_conflict() => {
                    warn!(attempts, "resync transaction conflicted, retrying after backoff");
                    tokio::select! {
                        () = cancel.cancelled() => return Err(ResyncError::Cancelled),
                        () = tokio::time::sleep(self.conflict_backoff) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resyncs immediately and then every `interval` until `cancel` fires.
    /// Failures are logged and retried on the next tick.
    pub async fn run(&self, interval: Duration, cancel: &CancellationToken) {
        loop {
            match self.resync(cancel).await {
                Ok(report) => info!(
                    writes = report.total_writes(),
                    attempts = report.attempts,
                    "read cache resynced"
                ),
                Err(ResyncError::Cancelled) => break,
                Err(err) => warn!(error = %err, "read cache resync failed"),
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        debug!("resync loop stopped");
    }

    async fn load_target(&self) -> ResyncResult<Target> {
        let releases = latest_revisions(self.charts.list_all_releases().await?);
        let configs = self.configs.list_release_configs().await?;
        Ok(Target {
            releases,
            projects: project_targets(&configs),
        })
    }

    async fn current(&self, map: CacheMap) -> ResyncResult<BTreeMap<String, String>> {
        Ok(self.store.get_all(map).await?.into_iter().collect())
    }

    /// Returns `true` when a stored task or project record may be removed.
    async fn is_idle<T>(&self, raw: &str) -> ResyncResult<bool>
    where
        T: TaskRecord + DeserializeOwned,
    {
        let Ok(record) = serde_json::from_str::<T>(raw) else {
            return Ok(true);
        };
        let Some(signature) = record.latest_signature() else {
            return Ok(true);
        };
        let state = self.broker.poll_state(signature).await?;
        Ok(is_finished_or_timeout(
            state.as_ref(),
            signature.timeout_sec(),
            self.clock.utc(),
        ))
    }

    async fn stale_idle_deletes<T>(
        &self,
        map: CacheMap,
        current: &BTreeMap<String, String>,
        wanted: &BTreeSet<&String>,
    ) -> ResyncResult<Vec<CacheWrite>>
    where
        T: TaskRecord + DeserializeOwned,
    {
        let mut writes = Vec::new();
        for (field, raw) in current {
            if wanted.contains(field) {
                continue;
            }
            if self.is_idle::<T>(raw).await? {
                writes.push(CacheWrite::delete(map, field.clone()));
            } else {
                debug!(%map, field = %field, "keeping stale record with live task");
            }
        }
        Ok(writes)
    }

    async fn resync_once(&self) -> ResyncResult<ResyncReport> {
        let target = self.load_target().await?;
        let token = self
            .store
            .watch(&CacheMap::ALL.map(WatchKey::Map))
            .await?;
        let current_releases = self.current(CacheMap::Releases).await?;
        let current_tasks = self.current(CacheMap::ReleaseTasks).await?;
        let current_projects = self.current(CacheMap::Projects).await?;

        let mut report = ResyncReport::default();
        let mut writes = Vec::new();

        for (field, release) in &target.releases {
            let value = serde_json::to_string(release)?;
            if current_releases.get(field) != Some(&value) {
                writes.push(CacheWrite::set(CacheMap::Releases, field.clone(), value));
                report.releases_set += 1;
            }
        }
        for field in current_releases.keys() {
            if !target.releases.contains_key(field) {
                writes.push(CacheWrite::delete(CacheMap::Releases, field.clone()));
                report.releases_deleted += 1;
            }
        }

        for (field, release) in &target.releases {
            if !current_tasks.contains_key(field) {
                let placeholder = ReleaseTask::placeholder(&release.key()?);
                writes.push(CacheWrite::set(
                    CacheMap::ReleaseTasks,
                    field.clone(),
                    serde_json::to_string(&placeholder)?,
                ));
                report.tasks_set += 1;
            }
        }
        let wanted_tasks: BTreeSet<&String> = target.releases.keys().collect();
        let task_deletes = self
            .stale_idle_deletes::<ReleaseTask>(CacheMap::ReleaseTasks, &current_tasks, &wanted_tasks)
            .await?;
        report.tasks_deleted = task_deletes.len();
        writes.extend(task_deletes);

        for (field, project) in &target.projects {
            if !current_projects.contains_key(field) {
                writes.push(CacheWrite::set(
                    CacheMap::Projects,
                    field.clone(),
                    serde_json::to_string(project)?,
                ));
                report.projects_set += 1;
            }
        }
        let wanted_projects: BTreeSet<&String> = target.projects.keys().collect();
        let project_deletes = self
            .stale_idle_deletes::<ProjectTask>(
                CacheMap::Projects,
                &current_projects,
                &wanted_projects,
            )
            .await?;
        report.projects_deleted = project_deletes.len();
        writes.extend(project_deletes);

        if writes.is_empty() {
            debug!("read cache already matches ground truth");
            return Ok(report);
        }
        self.store.exec(token, writes).await?;
        debug!(writes = report.total_writes(), "resync transaction committed");
        Ok(report)
    }
}

impl<S, B, M, R, C> Clone for ResyncService<S, B, M, R, C>
where
    S: CacheStore,
    B: TaskBroker,
    M: ChartManager,
    R: ReleaseConfigSource,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            broker: Arc::clone(&self.broker),
            charts: Arc::clone(&self.charts),
            configs: Arc::clone(&self.configs),
            clock: Arc::clone(&self.clock),
            conflict_backoff: self.conflict_backoff,
        }
    }
}
