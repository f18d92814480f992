//! Release mutation control and dependency reconciliation.
//!
//! This module serializes mutations of deployed releases through a task
//! broker, keeps a key-value read cache of release state in step with the
//! chart manager, and propagates output-config changes from a release to the
//! releases that depend on it. It follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
