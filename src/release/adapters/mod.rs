//! Adapters for the release ports.
//!
//! # Available Adapters
//!
//! - [`memory`]: deterministic in-process implementations of every port,
//!   used by unit tests, behaviour scenarios, and local flows.

pub mod memory;
