//! Port contracts for release mutation and dependency reconciliation.
//!
//! Ports define infrastructure-agnostic interfaces used by release services.

pub mod broker;
pub mod chart;
pub mod publisher;
pub mod source;
pub mod store;

pub use broker::{
    BrokerError, BrokerResult, TaskBroker, TaskHandler, TaskHandlerError, TaskHandlerFuture,
    TaskRegistry,
};
pub use chart::{ChartManager, ChartManagerError, ChartManagerResult};
pub use publisher::{EventPublisher, EventPublisherError, EventPublisherResult};
pub use source::{
    ReleaseConfigEvent, ReleaseConfigSource, ReleaseConfigSourceError, ReleaseConfigSourceResult,
};
pub use store::{
    CacheMap, CacheStore, CacheStoreError, CacheStoreResult, CacheWrite, WatchKey, WatchToken,
};
