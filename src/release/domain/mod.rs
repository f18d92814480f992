//! Domain model for release mutation and dependency reconciliation.
//!
//! The release domain models release identity, dispatched task signatures,
//! read-cache records, and dependency-declaring resources while keeping all
//! infrastructure concerns outside of the domain boundary.

mod cache;
mod config;
mod error;
mod event;
mod ids;
mod request;
mod signature;
mod task;

pub use cache::{ReleaseCache, ReleaseResourceMeta};
pub use config::{
    ConfigValues, PROJECT_NAME_LABEL, RELEASE_CONFIG_KIND, ReleaseConfig, ReleaseConfigSpec,
    config_values_differ,
};
pub use error::ReleaseDomainError;
pub use event::{
    RELEASE_CONFIG_TOPIC, ReleaseConfigDeltaEvent, ReleaseConfigDeltaEventType,
    ReleaseConfigEventData, ResourceState,
};
pub use ids::{ReleaseKey, resolve_dependency};
pub use request::{
    CREATE_RELEASE_TASK, DELETE_RELEASE_TASK, DeleteReleaseArgs, InstallReleaseArgs,
    ReleaseRequest,
};
pub use signature::{
    TASK_ARG_TYPE, TaskArg, TaskPayload, TaskSignature, TaskState, TaskStatus,
    is_finished_or_timeout,
};
pub use task::{ProjectTask, ReleaseTask, TaskRecord, field_name};
