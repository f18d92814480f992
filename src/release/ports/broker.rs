//! Task broker port and the registry of operation handlers it executes.

use crate::release::domain::{TaskSignature, TaskState, TaskStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for task broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Future returned by a registered operation handler.
pub type TaskHandlerFuture = Pin<Box<dyn Future<Output = Result<(), TaskHandlerError>> + Send>>;

/// Operation handler: receives the single serialized argument of a task.
pub type TaskHandler = Arc<dyn Fn(String) -> TaskHandlerFuture + Send + Sync>;

/// Failure reported by an operation handler; recorded on the task state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TaskHandlerError(String);

impl TaskHandlerError {
    /// Creates a handler error from any displayable failure.
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// Explicit operation-name to handler table, built at startup and handed to
/// the broker's workers.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, TaskHandler>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, handler: TaskHandler) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Returns the handler registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TaskHandler> {
        self.handlers.get(name).cloned()
    }

    /// Returns `true` when a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TaskRegistry")
            .field("handlers", &names)
            .finish()
    }
}

/// Dispatch contract for asynchronous mutating operations.
///
/// Delivery is at-least-once, so registered handlers must be idempotent or
/// check current state before acting. The broker gives no ordering between
/// tasks; per-release ordering is enforced by the mutation guard.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Records a `Pending` state for `signature` without queueing it.
    ///
    /// Lets a caller make the task visible to pollers before it commits to
    /// sending it. A reserved signature that is never sent should be purged.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unavailable`] when the backend cannot be reached.
    async fn reserve(&self, signature: &TaskSignature) -> BrokerResult<()>;

    /// Queues `signature` for execution by a worker and returns its UUID.
    ///
    /// Records a `Pending` state when the signature was not reserved first.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unavailable`] when the backend cannot be reached.
    async fn send(&self, signature: &TaskSignature) -> BrokerResult<uuid::Uuid>;

    /// Polls the current state of a task.
    ///
    /// Returns `None` when the broker has no state for it: never sent,
    /// purged, or expired.
    async fn poll_state(&self, signature: &TaskSignature) -> BrokerResult<Option<TaskState>>;

    /// Removes the stored state of a task.
    async fn purge(&self, signature: &TaskSignature) -> BrokerResult<()>;

    /// Blocks until the task completes or its timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::TaskFailed`] when the handler failed,
    /// [`BrokerError::Timeout`] when `timeout_sec` elapsed first (the task may
    /// still be running), and [`BrokerError::UnknownTask`] when the state
    /// disappeared while waiting.
    async fn await_task(
        &self,
        signature: &TaskSignature,
        poll_interval: Duration,
    ) -> BrokerResult<()> {
        let wait = async {
            loop {
                match self.poll_state(signature).await? {
                    None => return Err(BrokerError::UnknownTask(signature.to_string())),
                    Some(state) if state.status == TaskStatus::Success => return Ok(()),
                    Some(state) if state.status == TaskStatus::Failure => {
                        return Err(BrokerError::TaskFailed {
                            task: signature.to_string(),
                            message: state.error.unwrap_or_default(),
                        });
                    }
                    Some(_) => tokio::time::sleep(poll_interval).await,
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(signature.timeout_sec()), wait)
            .await
            .map_err(|_| BrokerError::Timeout(signature.to_string()))?
    }
}

/// Errors returned by task broker implementations.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// The broker backend cannot be reached.
    #[error("task broker unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),

    /// The broker holds no state for the task.
    #[error("task {0} is unknown to the broker")]
    UnknownTask(String),

    /// The task handler failed.
    #[error("task {task} failed: {message}")]
    TaskFailed {
        /// Task display name.
        task: String,
        /// Failure reported by the handler.
        message: String,
    },

    /// The task did not complete within its timeout.
    #[error("task {0} did not finish before its timeout")]
    Timeout(String),
}

impl BrokerError {
    /// Wraps a backend failure.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }
}
