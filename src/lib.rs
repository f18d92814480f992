//! Harbormaster: release mutation control for a chart-based deployment
//! platform.
//!
//! This crate serializes install, upgrade, pause, recover, and delete
//! operations on deployed releases so each release has at most one
//! outstanding task, keeps a key-value read cache of release state
//! reconciled against the chart manager, and reloads dependent releases when
//! a dependency publishes new output configuration.
//!
//! # Architecture
//!
//! Harbormaster follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for the task broker, key-value
//!   store, chart manager, resource watch, and event bus
//! - **Adapters**: Concrete implementations of ports
//!
//! # Modules
//!
//! - [`release`]: Release mutation, read-cache resync, and dependency
//!   reconciliation
//! - [`workqueue`]: Coalescing, delaying work queue used by the controller
//! - [`config`]: Runtime settings
//! - [`logging`]: Tracing subscriber setup

pub mod config;
pub mod logging;
pub mod release;
pub mod workqueue;
