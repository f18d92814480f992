//! Unit tests for release mutation, resync, and dependency reconciliation.

mod resync_tests;
mod support;
