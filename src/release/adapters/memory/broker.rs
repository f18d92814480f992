//! In-process task broker with a bounded worker pool.

use async_trait::async_trait;
use chrono::TimeDelta;
use mockable::Clock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::release::{
    domain::{TaskPayload, TaskSignature, TaskState, TaskStatus},
    ports::{BrokerError, BrokerResult, TaskBroker, TaskRegistry},
};

/// Default lifetime of a stored task state.
pub const DEFAULT_RESULTS_EXPIRE_IN: Duration = Duration::from_secs(3600);

/// Task broker that runs registered handlers on tokio tasks.
///
/// Sent tasks travel as their [`TaskPayload`]; workers look the handler up by
/// the payload name and hand it the single string argument.
///
/// Task states expire `results_expire_in` after creation. Expired states read
/// as absent and are evicted whenever the state table is touched. Workers only run once [`InMemoryTaskBroker::start`] is called, so a
/// broker that is never started keeps every sent task `Pending`.
pub struct InMemoryTaskBroker<C: Clock + Send + Sync> {
    inner: Arc<BrokerInner<C>>,
}

struct BrokerInner<C: Clock + Send + Sync> {
    clock: Arc<C>,
    results_expire_in: Duration,
    states: RwLock<HashMap<Uuid, TaskState>>,
    sender: mpsc::UnboundedSender<QueuedTask>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<QueuedTask>>>,
    available: AtomicBool,
}

/// A sent task as it waits for a worker.
struct QueuedTask {
    uuid: Uuid,
    payload: TaskPayload,
}

impl<C: Clock + Send + Sync> Clone for InMemoryTaskBroker<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> InMemoryTaskBroker<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a broker whose states expire after [`DEFAULT_RESULTS_EXPIRE_IN`].
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self::with_results_expire_in(clock, DEFAULT_RESULTS_EXPIRE_IN)
    }

    /// Creates a broker with a custom state lifetime.
    #[must_use]
    pub fn with_results_expire_in(clock: Arc<C>, results_expire_in: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BrokerInner {
                clock,
                results_expire_in,
                states: RwLock::new(HashMap::new()),
                sender,
                receiver: Mutex::new(Some(receiver)),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Returns how many task states are currently stored, expired or not.
    #[must_use]
    pub fn stored_state_count(&self) -> usize {
        self.inner.state_count()
    }

    /// Simulates the backend going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Starts the worker pool.
    ///
    /// At most `concurrency` handlers run at once. The dispatch loop stops
    /// taking new tasks once `cancel` fires; handlers already running finish.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unavailable`] when the workers were already
    /// started.
    pub fn start(
        &self,
        registry: TaskRegistry,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> BrokerResult<JoinHandle<()>> {
        let taken = self
            .inner
            .receiver
            .lock()
            .map_err(|err| BrokerError::unavailable(std::io::Error::other(err.to_string())))?
            .take();
        let Some(mut receiver) = taken else {
            return Err(BrokerError::unavailable(std::io::Error::other(
                "broker workers already started",
            )));
        };
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    () = cancel.cancelled() => None,
                    next = receiver.recv() => next,
                };
                let Some(task) = next else {
                    break;
                };
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let worker = Arc::clone(&inner);
                let handlers = registry.clone();
                tokio::spawn(async move {
                    worker.execute(&handlers, task).await;
                    drop(permit);
                });
            }
            debug!("task broker dispatch loop stopped");
        }))
    }
}

impl<C: Clock + Send + Sync> BrokerInner<C> {
    fn ensure_available(&self) -> BrokerResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::unavailable(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "task broker backend is unreachable",
            )))
        }
    }

    fn lock_error(err: impl std::fmt::Display) -> BrokerError {
        BrokerError::unavailable(std::io::Error::other(err.to_string()))
    }

    fn record_pending(&self, signature: &TaskSignature) -> BrokerResult<()> {
        let now = self.clock.utc();
        let mut states = self.states.write().map_err(Self::lock_error)?;
        self.evict_expired(&mut states);
        states
            .entry(signature.uuid())
            .or_insert_with(|| TaskState::pending(signature, now));
        Ok(())
    }

    fn is_expired(&self, state: &TaskState) -> bool {
        let ttl = TimeDelta::from_std(self.results_expire_in).unwrap_or(TimeDelta::MAX);
        self.clock.utc().signed_duration_since(state.created_at) > ttl
    }

    fn evict_expired(&self, states: &mut HashMap<Uuid, TaskState>) {
        let before = states.len();
        states.retain(|_, state| !self.is_expired(state));
        let evicted = before - states.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired task states");
        }
    }

    fn state_count(&self) -> usize {
        self.states.read().map(|states| states.len()).unwrap_or_default()
    }

    fn transition(&self, uuid: Uuid, status: TaskStatus, error: Option<String>) {
        match self.states.write() {
            Ok(mut states) => {
                if let Some(state) = states.get_mut(&uuid) {
                    state.status = status;
                    state.error = error;
                }
            }
            Err(err) => warn!(task = %uuid, error = %err, "failed to record task state"),
        }
    }

    async fn execute(&self, registry: &TaskRegistry, task: QueuedTask) {
        let QueuedTask { uuid, payload } = task;
        self.transition(uuid, TaskStatus::Running, None);
        let Some(handler) = registry.get(&payload.name) else {
            warn!(task = %uuid, name = %payload.name, "no handler registered for task");
            self.transition(
                uuid,
                TaskStatus::Failure,
                Some(format!("no handler registered for {}", payload.name)),
            );
            return;
        };
        let Some(arg) = payload.string_arg() else {
            warn!(task = %uuid, name = %payload.name, "task payload has no string argument");
            self.transition(
                uuid,
                TaskStatus::Failure,
                Some(format!("task {} has no string argument", payload.name)),
            );
            return;
        };
        match handler(arg.to_owned()).await {
            Ok(()) => {
                debug!(task = %uuid, name = %payload.name, "task succeeded");
                self.transition(uuid, TaskStatus::Success, None);
            }
            Err(err) => {
                warn!(task = %uuid, name = %payload.name, error = %err, "task failed");
                self.transition(uuid, TaskStatus::Failure, Some(err.to_string()));
            }
        }
    }
}

#[async_trait]
impl<C> TaskBroker for InMemoryTaskBroker<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn reserve(&self, signature: &TaskSignature) -> BrokerResult<()> {
        self.inner.ensure_available()?;
        self.inner.record_pending(signature)
    }

    async fn send(&self, signature: &TaskSignature) -> BrokerResult<Uuid> {
        self.inner.ensure_available()?;
        self.inner.record_pending(signature)?;
        self.inner
            .sender
            .send(QueuedTask {
                uuid: signature.uuid(),
                payload: signature.payload(),
            })
            .map_err(|err| BrokerError::unavailable(std::io::Error::other(err.to_string())))?;
        Ok(signature.uuid())
    }

    async fn poll_state(&self, signature: &TaskSignature) -> BrokerResult<Option<TaskState>> {
        self.inner.ensure_available()?;
        let mut states = self.inner.states.write().map_err(BrokerInner::<C>::lock_error)?;
        let expired = states
            .get(&signature.uuid())
            .is_some_and(|state| self.inner.is_expired(state));
        if expired {
            states.remove(&signature.uuid());
            return Ok(None);
        }
        Ok(states.get(&signature.uuid()).cloned())
    }

    async fn purge(&self, signature: &TaskSignature) -> BrokerResult<()> {
        self.inner.ensure_available()?;
        let mut states = self.inner.states.write().map_err(BrokerInner::<C>::lock_error)?;
        states.remove(&signature.uuid());
        Ok(())
    }
}
