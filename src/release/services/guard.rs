//! Per-release at-most-one-outstanding-task enforcement.

use mockable::Clock;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::{StateCache, StateCacheError};
use crate::release::{
    domain::{ReleaseKey, ReleaseTask, TaskRecord, TaskSignature, is_finished_or_timeout},
    ports::{BrokerError, CacheMap, CacheStore, CacheStoreError, CacheWrite, TaskBroker, WatchKey},
};

/// Leading text of the busy rejection message.
pub const BUSY_MESSAGE_PREFIX: &str = "please wait for the release latest task";

const DEFAULT_RESERVE_ATTEMPTS: u32 = 5;

/// Errors returned by [`ReleaseMutationGuard`].
#[derive(Debug, Error)]
pub enum GuardError {
    /// The release has no task record.
    #[error("release task {0} not found")]
    NotFound(ReleaseKey),

    /// A previous task for the release is still outstanding.
    #[error("{prefix} {signature} finished or timeout", prefix = BUSY_MESSAGE_PREFIX)]
    Busy {
        /// Release that was rejected.
        key: ReleaseKey,
        /// Outstanding signature.
        signature: TaskSignature,
    },

    /// Read-cache failure.
    #[error(transparent)]
    StateCache(#[from] StateCacheError),

    /// Store failure, including exhausted reservation retries.
    #[error(transparent)]
    Store(#[from] CacheStoreError),

    /// Broker failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Task arguments could not be encoded.
    #[error("failed to encode task arguments: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GuardError {
    /// Returns `true` when the release is busy with an outstanding task.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Returns `true` when the release has no task record.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for [`ReleaseMutationGuard`] operations.
pub type GuardResult<T> = Result<T, GuardError>;

/// Enforces that a release has at most one outstanding task.
///
/// The guard is the sole timeout authority: a signature stops blocking once
/// its state is absent, completed, or older than its timeout. Timing out never
/// cancels the worker running the task, so a stale task may still finish and
/// overwrite cache state written by a newer one.
pub struct ReleaseMutationGuard<S, B, C>
where
    S: CacheStore,
    B: TaskBroker,
    C: Clock + Send + Sync,
{
    cache: StateCache<S>,
    broker: Arc<B>,
    clock: Arc<C>,
    reserve_attempts: u32,
}

impl<S, B, C> Clone for ReleaseMutationGuard<S, B, C>
where
    S: CacheStore,
    B: TaskBroker,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            broker: Arc::clone(&self.broker),
            clock: Arc::clone(&self.clock),
            reserve_attempts: self.reserve_attempts,
        }
    }
}

impl<S, B, C> ReleaseMutationGuard<S, B, C>
where
    S: CacheStore,
    B: TaskBroker,
    C: Clock + Send + Sync,
{
    /// Creates a guard.
    #[must_use]
    pub const fn new(cache: StateCache<S>, broker: Arc<B>, clock: Arc<C>) -> Self {
        Self {
            cache,
            broker,
            clock,
            reserve_attempts: DEFAULT_RESERVE_ATTEMPTS,
        }
    }

    /// Sets how many times a reservation is retried after a store conflict.
    #[must_use]
    pub const fn with_reserve_attempts(mut self, attempts: u32) -> Self {
        self.reserve_attempts = attempts;
        self
    }

    /// Returns `true` when `signature` no longer blocks new mutations.
    ///
    /// Never blocks on the task itself; only the broker state is polled.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Broker`] when the broker cannot be polled.
    pub async fn is_finished_or_timeout(&self, signature: &TaskSignature) -> GuardResult<bool> {
        let state = self.broker.poll_state(signature).await?;
        Ok(is_finished_or_timeout(
            state.as_ref(),
            signature.timeout_sec(),
            self.clock.utc(),
        ))
    }

    /// Fetches the release's task record and checks that it is idle.
    ///
    /// Returns `None` when the record is absent and `allow_missing` is set.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::NotFound`] when the record is absent and
    /// `allow_missing` is not set, and [`GuardError::Busy`] when its latest
    /// signature is still outstanding.
    pub async fn validate(
        &self,
        key: &ReleaseKey,
        allow_missing: bool,
    ) -> GuardResult<Option<ReleaseTask>> {
        let task = match self.cache.get_release_task(key).await {
            Ok(task) => task,
            Err(err) if err.is_not_found() => {
                return if allow_missing {
                    Ok(None)
                } else {
                    Err(GuardError::NotFound(key.clone()))
                };
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(signature) = task.latest_signature() {
            if !self.is_finished_or_timeout(signature).await? {
                debug!(release = %key, task = %signature, "release is busy");
                return Err(GuardError::Busy {
                    key: key.clone(),
                    signature: signature.clone(),
                });
            }
        }
        Ok(Some(task))
    }

    /// Dispatches `operation` for a release and records it as the release's
    /// latest task.
    ///
    /// The new signature is reserved with the broker (state `Pending`) and
    /// written to the release's task record inside a watch/exec transaction
    /// that re-validates the record, so two concurrent dispatches for one
    /// release cannot both pass. Only then is the task queued. The previous
    /// signature's state is purged afterwards on a best-effort basis.
    ///
    /// A failed purge leaves an orphaned task state behind until the broker's
    /// result TTL expires it; it blocks nothing because no record points at
    /// it any more. A failure between the record write and the send leaves a
    /// record pointing at a purged signature, which reads as finished.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Busy`] when a previous task is outstanding,
    /// [`GuardError::Broker`] when the broker rejects the task, and
    /// [`GuardError::Store`] when reservation conflicts persist.
    pub async fn dispatch<A>(
        &self,
        key: &ReleaseKey,
        operation: &str,
        args: &A,
        timeout_sec: u64,
    ) -> GuardResult<TaskSignature>
    where
        A: Serialize + Sync,
    {
        let arg = serde_json::to_string(args)?;
        let signature = TaskSignature::new(operation, arg, timeout_sec);
        let previous = self.reserve(key, &signature).await?;

        if let Err(err) = self.broker.send(&signature).await {
            warn!(release = %key, task = %signature, error = %err, "failed to send task");
            if let Err(purge_err) = self.broker.purge(&signature).await {
                warn!(task = %signature, error = %purge_err, "failed to purge unsent task");
            }
            return Err(err.into());
        }
        debug!(release = %key, task = %signature, "dispatched release task");

        if let Some(old) = previous {
            if let Err(err) = self.broker.purge(&old).await {
                warn!(
                    release = %key,
                    task = %old,
                    error = %err,
                    "failed to purge superseded task state"
                );
            }
        }
        Ok(signature)
    }

    async fn reserve(
        &self,
        key: &ReleaseKey,
        signature: &TaskSignature,
    ) -> GuardResult<Option<TaskSignature>> {
        let field = key.field_name();
        let record = serde_json::to_string(&ReleaseTask::with_signature(key, signature.clone()))?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let token = self
                .cache
                .store()
                .watch(&[WatchKey::Field(CacheMap::ReleaseTasks, field.clone())])
                .await?;
            let previous = self
                .validate(key, true)
                .await?
                .and_then(|task| task.latest_signature().cloned());
            self.broker.reserve(signature).await?;
            let write = CacheWrite::set(CacheMap::ReleaseTasks, field.clone(), record.clone());
            match self.cache.store().exec(token, vec![write]).await {
                Ok(()) => return Ok(previous),
                Err(err) => {
                    if let Err(purge_err) = self.broker.purge(signature).await {
                        warn!(task = %signature, error = %purge_err, "failed to release reservation");
                    }
                    if !err.is_conflict() || attempt >= self.reserve_attempts {
                        return Err(err.into());
                    }
                    debug!(release = %key, attempt, "release task record changed, retrying");
                }
            }
        }
    }
}
