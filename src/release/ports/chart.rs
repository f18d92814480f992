//! Chart manager port: the release ground truth and its mutation primitives.

use crate::release::domain::{ConfigValues, ReleaseCache, ReleaseRequest};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for chart manager operations.
pub type ChartManagerResult<T> = Result<T, ChartManagerError>;

/// Chart rendering and release lifecycle contract.
#[async_trait]
pub trait ChartManager: Send + Sync {
    /// Lists every release revision the chart manager knows about.
    ///
    /// The same `(namespace, name)` may appear once per observed revision.
    async fn list_all_releases(&self) -> ChartManagerResult<Vec<ReleaseCache>>;

    /// Installs the release or upgrades it to `request`, returning the
    /// rendered snapshot of the new revision.
    ///
    /// # Errors
    ///
    /// Returns [`ChartManagerError::InvalidChart`] when the chart cannot be
    /// rendered and [`ChartManagerError::Backend`] on infrastructure failure.
    async fn install_or_upgrade(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
        dependencies_config_values: &ConfigValues,
        paused: bool,
    ) -> ChartManagerResult<ReleaseCache>;

    /// Removes a release.
    ///
    /// # Errors
    ///
    /// Returns [`ChartManagerError::NotFound`] when the release does not exist.
    async fn delete_release(
        &self,
        namespace: &str,
        name: &str,
        delete_pvcs: bool,
    ) -> ChartManagerResult<()>;
}

/// Errors returned by chart manager implementations.
#[derive(Debug, Clone, Error)]
pub enum ChartManagerError {
    /// The release does not exist.
    #[error("release not found: {0}")]
    NotFound(String),

    /// The chart could not be rendered.
    #[error("invalid chart for release {release}: {reason}")]
    InvalidChart {
        /// Release display key.
        release: String,
        /// Rendering failure.
        reason: String,
    },

    /// Infrastructure failure.
    #[error("chart manager error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl ChartManagerError {
    /// Wraps an infrastructure failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
