//! Task signatures, broker task states, and the dispatch payload.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Argument type tag used by every dispatched operation.
pub const TASK_ARG_TYPE: &str = "string";

/// Durable handle to one asynchronous mutating operation.
///
/// Immutable once created. The `timeout_sec` is a soft deadline: once it has
/// elapsed the signature stops blocking new mutations, but the worker running
/// it is never cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskSignature {
    uuid: Uuid,
    name: String,
    arg: String,
    timeout_sec: u64,
}

impl TaskSignature {
    /// Creates a signature with a fresh UUID.
    #[must_use]
    pub fn new(name: impl Into<String>, arg: impl Into<String>, timeout_sec: u64) -> Self {
        Self::with_uuid(Uuid::new_v4(), name, arg, timeout_sec)
    }

    /// Creates a signature with an existing UUID.
    #[must_use]
    pub fn with_uuid(
        uuid: Uuid,
        name: impl Into<String>,
        arg: impl Into<String>,
        timeout_sec: u64,
    ) -> Self {
        Self {
            uuid,
            name: name.into(),
            arg: arg.into(),
            timeout_sec,
        }
    }

    /// Returns the task UUID.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the serialized operation arguments.
    #[must_use]
    pub fn arg(&self) -> &str {
        &self.arg
    }

    /// Returns the soft timeout in seconds.
    #[must_use]
    pub const fn timeout_sec(&self) -> u64 {
        self.timeout_sec
    }

    /// Builds the broker dispatch payload for this signature.
    #[must_use]
    pub fn payload(&self) -> TaskPayload {
        TaskPayload {
            name: self.name.clone(),
            args: vec![TaskArg {
                kind: TASK_ARG_TYPE.to_owned(),
                value: self.arg.clone(),
            }],
        }
    }
}

impl fmt::Display for TaskSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.uuid)
    }
}

/// Wire payload handed to the broker: `{name, args: [{type, value}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Operation name.
    pub name: String,
    /// Positional arguments; operations in this crate always send one string.
    pub args: Vec<TaskArg>,
}

impl TaskPayload {
    /// Returns the value of the single string argument, if present.
    #[must_use]
    pub fn string_arg(&self) -> Option<&str> {
        self.args
            .iter()
            .find(|arg| arg.kind == TASK_ARG_TYPE)
            .map(|arg| arg.value.as_str())
    }
}

/// One typed positional task argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskArg {
    /// Argument type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Argument value.
    pub value: String,
}

/// Lifecycle status reported by the broker for a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Accepted by the broker, not yet picked up by a worker.
    Pending,
    /// A worker is executing the task.
    Running,
    /// The handler returned successfully.
    Success,
    /// The handler failed.
    Failure,
}

impl TaskStatus {
    /// Returns `true` for terminal statuses.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Broker-side state of one task, polled through the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    /// Operation name.
    pub name: String,
    /// Task UUID.
    pub uuid: Uuid,
    /// Current status.
    pub status: TaskStatus,
    /// Failure message when `status` is `Failure`.
    pub error: Option<String>,
    /// Time the broker accepted the task.
    pub created_at: DateTime<Utc>,
}

impl TaskState {
    /// Creates the pending state recorded when a signature is accepted.
    #[must_use]
    pub fn pending(signature: &TaskSignature, created_at: DateTime<Utc>) -> Self {
        Self {
            name: signature.name().to_owned(),
            uuid: signature.uuid(),
            status: TaskStatus::Pending,
            error: None,
            created_at,
        }
    }

    /// Returns `true` when the task reached a terminal status.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Returns `true` when the task is older than `timeout_sec` at `now`.
    #[must_use]
    pub fn is_timed_out(&self, timeout_sec: u64, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        i64::try_from(timeout_sec)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .is_some_and(|limit| age > limit)
    }
}

/// Decides whether a signature no longer blocks new mutations.
///
/// An absent state (never recorded, purged, or expired) counts as finished.
#[must_use]
pub fn is_finished_or_timeout(
    state: Option<&TaskState>,
    timeout_sec: u64,
    now: DateTime<Utc>,
) -> bool {
    state.is_none_or(|task_state| {
        task_state.is_completed() || task_state.is_timed_out(timeout_sec, now)
    })
}
