//! Release mutation use cases and the task handlers that execute them.

use async_trait::async_trait;
use mockable::Clock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{GuardError, ReleaseMutationGuard, StateCache, StateCacheError};
use crate::config::TaskSettings;
use crate::release::{
    domain::{
        CREATE_RELEASE_TASK, ConfigValues, DELETE_RELEASE_TASK, DeleteReleaseArgs,
        InstallReleaseArgs, ReleaseCache, ReleaseDomainError, ReleaseKey, ReleaseRequest,
        TaskSignature, config_values_differ, resolve_dependency,
    },
    ports::{
        BrokerError, CacheStore, ChartManager, ChartManagerError, ReleaseConfigSource,
        ReleaseConfigSourceError, TaskBroker, TaskHandler, TaskHandlerError, TaskHandlerFuture,
        TaskRegistry,
    },
};

/// Service-level errors for release operations.
#[derive(Debug, Error)]
pub enum ReleaseServiceError {
    /// The release does not exist.
    #[error("release {0} not found")]
    NotFound(ReleaseKey),

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] ReleaseDomainError),

    /// The mutation guard rejected or failed the dispatch.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Read-cache failure.
    #[error(transparent)]
    StateCache(#[from] StateCacheError),

    /// Broker failure, including synchronous wait failures.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Chart manager failure.
    #[error(transparent)]
    Chart(#[from] ChartManagerError),

    /// Dependency-declaring resource lookup failed.
    #[error(transparent)]
    Source(#[from] ReleaseConfigSourceError),

    /// Task arguments could not be decoded.
    #[error("malformed task arguments: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReleaseServiceError {
    /// Returns `true` when the release is busy with an outstanding task.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Guard(err) if err.is_busy())
    }

    /// Returns `true` when the release or its task record is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Guard(err) => err.is_not_found(),
            Self::StateCache(err) => err.is_not_found(),
            _ => false,
        }
    }
}

/// Result type for release service operations.
pub type ReleaseServiceResult<T> = Result<T, ReleaseServiceError>;

/// Release operations the dependency controller relies on.
#[async_trait]
pub trait ReleaseReloader: Send + Sync {
    /// Re-derives a release's dependency config values and upgrades it when
    /// they changed.
    async fn reload_release(&self, key: &ReleaseKey) -> ReleaseServiceResult<()>;

    /// Returns `true` when the release is present in the read cache.
    async fn release_exists(&self, key: &ReleaseKey) -> ReleaseServiceResult<bool>;
}

/// Install, upgrade, delete, pause, recover, and reload of releases.
pub struct ReleaseService<S, B, M, R, C>
where
    S: CacheStore,
    B: TaskBroker,
    M: ChartManager,
    R: ReleaseConfigSource,
    C: Clock + Send + Sync,
{
    cache: StateCache<S>,
    guard: ReleaseMutationGuard<S, B, C>,
    broker: Arc<B>,
    charts: Arc<M>,
    configs: Arc<R>,
    settings: TaskSettings,
}

impl<S, B, M, R, C> ReleaseService<S, B, M, R, C>
where
    S: CacheStore + 'static,
    B: TaskBroker + 'static,
    M: ChartManager + 'static,
    R: ReleaseConfigSource + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a release service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        broker: Arc<B>,
        charts: Arc<M>,
        configs: Arc<R>,
        clock: Arc<C>,
        settings: TaskSettings,
    ) -> Self {
        let cache = StateCache::new(store);
        let guard = ReleaseMutationGuard::new(cache.clone(), Arc::clone(&broker), clock);
        Self {
            cache,
            guard,
            broker,
            charts,
            configs,
            settings,
        }
    }

    /// Returns the read cache this service writes.
    #[must_use]
    pub const fn state_cache(&self) -> &StateCache<S> {
        &self.cache
    }

    /// Returns the mutation guard.
    #[must_use]
    pub const fn guard(&self) -> &ReleaseMutationGuard<S, B, C> {
        &self.guard
    }

    /// Builds the operation registry the broker's workers execute.
    #[must_use]
    pub fn task_registry(self: &Arc<Self>) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        let install = Arc::clone(self);
        let install_handler: TaskHandler = Arc::new(move |arg: String| -> TaskHandlerFuture {
            let service = Arc::clone(&install);
            Box::pin(async move {
                service
                    .run_install_task(&arg)
                    .await
                    .map_err(TaskHandlerError::new)
            })
        });
        let delete = Arc::clone(self);
        let delete_handler: TaskHandler = Arc::new(move |arg: String| -> TaskHandlerFuture {
            let service = Arc::clone(&delete);
            Box::pin(async move {
                service
                    .run_delete_task(&arg)
                    .await
                    .map_err(TaskHandlerError::new)
            })
        });
        registry
            .register(CREATE_RELEASE_TASK, install_handler)
            .register(DELETE_RELEASE_TASK, delete_handler);
        registry
    }

    /// Reads a release from the read cache.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseServiceError::NotFound`] when the release is not
    /// cached.
    pub async fn get_release(&self, key: &ReleaseKey) -> ReleaseServiceResult<ReleaseCache> {
        self.cache
            .get_release_cache(key)
            .await
            .map_err(|err| not_found_or(err, key))
    }

    /// Lists cached releases, optionally restricted to one namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseServiceError::StateCache`] on read-cache failure.
    pub async fn list_releases(
        &self,
        namespace: Option<&str>,
    ) -> ReleaseServiceResult<Vec<ReleaseCache>> {
        Ok(self.cache.list_release_caches(namespace).await?)
    }

    /// Installs a release or upgrades it to `request`.
    ///
    /// Asynchronous callers get the signature immediately. Synchronous callers
    /// wait up to the timeout; a [`BrokerError::Timeout`] means the task may
    /// still be running. A `timeout_sec` of `0` selects the default.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseServiceError::Domain`] for an invalid request and a
    /// busy [`ReleaseServiceError::Guard`] error when a previous task for the
    /// release is outstanding.
    pub async fn install_upgrade(
        &self,
        namespace: &str,
        request: ReleaseRequest,
        is_async: bool,
        timeout_sec: u64,
    ) -> ReleaseServiceResult<TaskSignature> {
        request.validate()?;
        let key = ReleaseKey::new(namespace, request.name.clone())?;
        let args = InstallReleaseArgs {
            namespace: namespace.to_owned(),
            request,
            paused: None,
        };
        self.dispatch(&key, CREATE_RELEASE_TASK, &args, is_async, timeout_sec)
            .await
    }

    /// Like [`Self::install_upgrade`], retrying busy rejections.
    ///
    /// # Errors
    ///
    /// Returns the last busy error once the configured attempts are spent, or
    /// any other error immediately.
    pub async fn install_upgrade_with_retry(
        &self,
        namespace: &str,
        request: ReleaseRequest,
        is_async: bool,
        timeout_sec: u64,
    ) -> ReleaseServiceResult<TaskSignature> {
        let mut attempt = 1;
        loop {
            match self
                .install_upgrade(namespace, request.clone(), is_async, timeout_sec)
                .await
            {
                Err(err) if err.is_busy() && attempt < self.settings.busy_retry_attempts => {
                    warn!(namespace, release = %request.name, attempt, error = %err, "release is busy, retrying install");
                    attempt += 1;
                    tokio::time::sleep(self.settings.busy_retry_delay()).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Deletes a release.
    ///
    /// Returns `None` when the release has no task record, which means it
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns a busy [`ReleaseServiceError::Guard`] error when a previous
    /// task for the release is outstanding.
    pub async fn delete(
        &self,
        namespace: &str,
        name: &str,
        is_async: bool,
        timeout_sec: u64,
        delete_pvcs: bool,
    ) -> ReleaseServiceResult<Option<TaskSignature>> {
        let key = ReleaseKey::new(namespace, name)?;
        match self.guard.validate(&key, false).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                warn!(release = %key, "release task not found, nothing to delete");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }
        let args = DeleteReleaseArgs {
            namespace: namespace.to_owned(),
            release_name: name.to_owned(),
            delete_pvcs,
        };
        self.dispatch(&key, DELETE_RELEASE_TASK, &args, is_async, timeout_sec)
            .await
            .map(Some)
    }

    /// Like [`Self::delete`], retrying busy rejections.
    ///
    /// # Errors
    ///
    /// Returns the last busy error once the configured attempts are spent, or
    /// any other error immediately.
    pub async fn delete_with_retry(
        &self,
        namespace: &str,
        name: &str,
        is_async: bool,
        timeout_sec: u64,
        delete_pvcs: bool,
    ) -> ReleaseServiceResult<Option<TaskSignature>> {
        let mut attempt = 1;
        loop {
            match self
                .delete(namespace, name, is_async, timeout_sec, delete_pvcs)
                .await
            {
                Err(err) if err.is_busy() && attempt < self.settings.busy_retry_attempts => {
                    warn!(namespace, release = name, attempt, error = %err, "release is busy, retrying delete");
                    attempt += 1;
                    tokio::time::sleep(self.settings.busy_retry_delay()).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Pauses a release's workloads. A paused release is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseServiceError::NotFound`] when the release is not
    /// cached.
    pub async fn pause(
        &self,
        namespace: &str,
        name: &str,
        is_async: bool,
        timeout_sec: u64,
    ) -> ReleaseServiceResult<Option<TaskSignature>> {
        self.set_paused(namespace, name, true, is_async, timeout_sec)
            .await
    }

    /// Resumes a paused release. A running release is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseServiceError::NotFound`] when the release is not
    /// cached.
    pub async fn recover(
        &self,
        namespace: &str,
        name: &str,
        is_async: bool,
        timeout_sec: u64,
    ) -> ReleaseServiceResult<Option<TaskSignature>> {
        self.set_paused(namespace, name, false, is_async, timeout_sec)
            .await
    }

    async fn set_paused(
        &self,
        namespace: &str,
        name: &str,
        paused: bool,
        is_async: bool,
        timeout_sec: u64,
    ) -> ReleaseServiceResult<Option<TaskSignature>> {
        let key = ReleaseKey::new(namespace, name)?;
        let release = self.get_release(&key).await?;
        if release.paused == paused {
            info!(release = %key, paused, "release already in requested pause state");
            return Ok(None);
        }
        let args = InstallReleaseArgs {
            namespace: namespace.to_owned(),
            request: release.to_request(),
            paused: Some(paused),
        };
        self.dispatch(&key, CREATE_RELEASE_TASK, &args, is_async, timeout_sec)
            .await
            .map(Some)
    }

    /// Upgrades a release when its dependencies' output configs changed.
    ///
    /// A release that is no longer cached is ignored. The upgrade runs
    /// synchronously with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns a busy [`ReleaseServiceError::Guard`] error when a previous
    /// task for the release is outstanding.
    pub async fn reload(&self, key: &ReleaseKey) -> ReleaseServiceResult<()> {
        let release = match self.cache.get_release_cache(key).await {
            Ok(release) => release,
            Err(err) if err.is_not_found() => {
                debug!(release = %key, "release no longer exists, skipping reload");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let injected = self
            .dependency_output_configs(key.namespace(), &release.dependencies)
            .await?;
        if !config_values_differ(Some(&release.dependencies_config_values), Some(&injected)) {
            debug!(release = %key, "dependency output configs unchanged, skipping reload");
            return Ok(());
        }
        info!(release = %key, "dependency output configs changed, upgrading release");
        self.install_upgrade(key.namespace(), release.to_request(), false, 0)
            .await?;
        Ok(())
    }

    async fn dispatch<A>(
        &self,
        key: &ReleaseKey,
        operation: &str,
        args: &A,
        is_async: bool,
        timeout_sec: u64,
    ) -> ReleaseServiceResult<TaskSignature>
    where
        A: Serialize + Sync,
    {
        let timeout = self.settings.effective_timeout_secs(timeout_sec);
        let signature = self.guard.dispatch(key, operation, args, timeout).await?;
        if !is_async {
            self.broker
                .await_task(&signature, self.settings.poll_interval())
                .await?;
        }
        Ok(signature)
    }

    /// Maps each dependency alias to the output config its target publishes.
    ///
    /// Invalid edges and dependencies that publish nothing are skipped. Each
    /// output stays nested under its alias instead of being merged into one
    /// flat value set.
    async fn dependency_output_configs(
        &self,
        namespace: &str,
        dependencies: &BTreeMap<String, String>,
    ) -> ReleaseServiceResult<ConfigValues> {
        let mut injected = ConfigValues::new();
        for (alias, target) in dependencies {
            let dependency = match resolve_dependency(namespace, target) {
                Ok(dependency) => dependency,
                Err(err) => {
                    warn!(namespace, alias = %alias, error = %err, "skipping invalid dependency");
                    continue;
                }
            };
            let Some(config) = self.configs.get_release_config(&dependency).await? else {
                warn!(dependency = %dependency, "dependency release config not found");
                continue;
            };
            if let Some(output) = config.spec.output_config.filter(|output| !output.is_empty()) {
                injected.insert(alias.clone(), Value::Object(output));
            }
        }
        Ok(injected)
    }

    async fn run_install_task(&self, arg: &str) -> ReleaseServiceResult<()> {
        let args: InstallReleaseArgs = serde_json::from_str(arg)?;
        let key = ReleaseKey::new(args.namespace.clone(), args.request.name.clone())?;
        let previous = match self.cache.get_release_cache(&key).await {
            Ok(release) => Some(release),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };
        let paused = args
            .paused
            .unwrap_or_else(|| previous.as_ref().is_some_and(|release| release.paused));
        let injected = self
            .dependency_output_configs(&args.namespace, &args.request.dependencies)
            .await?;
        info!(
            release = %key,
            upgrade = previous.is_some(),
            paused,
            "rendering release"
        );
        let release = self
            .charts
            .install_or_upgrade(&args.namespace, &args.request, &injected, paused)
            .await?;
        self.cache.set_release_cache(&release).await?;
        Ok(())
    }

    async fn run_delete_task(&self, arg: &str) -> ReleaseServiceResult<()> {
        let args: DeleteReleaseArgs = serde_json::from_str(arg)?;
        let key = ReleaseKey::new(args.namespace.clone(), args.release_name.clone())?;
        match self
            .charts
            .delete_release(&args.namespace, &args.release_name, args.delete_pvcs)
            .await
        {
            Ok(()) => {}
            Err(ChartManagerError::NotFound(_)) => {
                warn!(release = %key, "release already removed from the chart manager");
            }
            Err(err) => return Err(err.into()),
        }
        // The task record may already point at a newer mutation; resync
        // removes it once that mutation is idle.
        self.cache.delete_release_cache(&key).await?;
        info!(release = %key, "release deleted");
        Ok(())
    }
}

fn not_found_or(err: StateCacheError, key: &ReleaseKey) -> ReleaseServiceError {
    if err.is_not_found() {
        ReleaseServiceError::NotFound(key.clone())
    } else {
        err.into()
    }
}

#[async_trait]
impl<S, B, M, R, C> ReleaseReloader for ReleaseService<S, B, M, R, C>
where
    S: CacheStore + 'static,
    B: TaskBroker + 'static,
    M: ChartManager + 'static,
    R: ReleaseConfigSource + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn reload_release(&self, key: &ReleaseKey) -> ReleaseServiceResult<()> {
        self.reload(key).await
    }

    async fn release_exists(&self, key: &ReleaseKey) -> ReleaseServiceResult<bool> {
        match self.cache.get_release_cache(key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
