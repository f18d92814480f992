//! External event bus port.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for event publishing.
pub type EventPublisherResult<T> = Result<T, EventPublisherError>;

/// Sends serialized change events to an external bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `message` on `topic`.
    async fn publish(&self, topic: &str, message: &str) -> EventPublisherResult<()>;
}

/// Errors returned by event publishers.
#[derive(Debug, Clone, Error)]
pub enum EventPublisherError {
    /// The bus cannot be reached.
    #[error("event bus unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl EventPublisherError {
    /// Wraps a transport failure.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }
}
