//! Step definitions for release mutation guard scenarios.

mod given;
mod then;
mod when;
pub mod world;
