//! Read-only access to dependency-declaring resources and their changes.

use crate::release::domain::{ReleaseConfig, ReleaseKey};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Result type for release config source operations.
pub type ReleaseConfigSourceResult<T> = Result<T, ReleaseConfigSourceError>;

/// Change notification for one dependency-declaring resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseConfigEvent {
    /// The resource was created.
    Added(ReleaseConfig),
    /// The resource changed.
    Updated {
        /// State before the change.
        old: ReleaseConfig,
        /// State after the change.
        new: ReleaseConfig,
    },
    /// The resource was removed; carries its last known state.
    Deleted(ReleaseConfig),
}

/// Source of dependency-declaring resources.
#[async_trait]
pub trait ReleaseConfigSource: Send + Sync {
    /// Lists every resource.
    async fn list_release_configs(&self) -> ReleaseConfigSourceResult<Vec<ReleaseConfig>>;

    /// Fetches one resource; `None` when it does not exist.
    async fn get_release_config(
        &self,
        key: &ReleaseKey,
    ) -> ReleaseConfigSourceResult<Option<ReleaseConfig>>;

    /// Subscribes to change notifications emitted after this call.
    fn subscribe(&self) -> broadcast::Receiver<ReleaseConfigEvent>;
}

/// Errors returned by release config sources.
#[derive(Debug, Clone, Error)]
pub enum ReleaseConfigSourceError {
    /// Infrastructure failure.
    #[error("release config source error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl ReleaseConfigSourceError {
    /// Wraps an infrastructure failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
