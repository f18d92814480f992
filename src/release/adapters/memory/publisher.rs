//! Event publisher that records every message.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::release::{
    domain::ReleaseConfigDeltaEvent,
    ports::{EventPublisher, EventPublisherError, EventPublisherResult},
};

/// One message captured by [`RecordingEventPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Topic the message was sent on.
    pub topic: String,
    /// Serialized payload.
    pub message: String,
}

/// Thread-safe publisher that keeps messages in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventPublisher {
    messages: Arc<RwLock<Vec<PublishedMessage>>>,
}

impl RecordingEventPublisher {
    /// Creates an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every message published so far.
    #[must_use]
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages
            .read()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Decodes every published message as a release config event, skipping
    /// payloads that do not decode.
    #[must_use]
    pub fn events(&self) -> Vec<ReleaseConfigDeltaEvent> {
        self.messages()
            .iter()
            .filter_map(|published| serde_json::from_str(&published.message).ok())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, topic: &str, message: &str) -> EventPublisherResult<()> {
        let mut messages = self.messages.write().map_err(|err| {
            EventPublisherError::unavailable(std::io::Error::other(err.to_string()))
        })?;
        messages.push(PublishedMessage {
            topic: topic.to_owned(),
            message: message.to_owned(),
        });
        Ok(())
    }
}
