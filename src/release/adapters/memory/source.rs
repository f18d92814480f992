//! In-memory dependency-declaring resources with change notifications.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use crate::release::{
    domain::{ReleaseConfig, ReleaseKey},
    ports::{
        ReleaseConfigEvent, ReleaseConfigSource, ReleaseConfigSourceError,
        ReleaseConfigSourceResult,
    },
};

const EVENT_CAPACITY: usize = 256;

/// Thread-safe in-memory release config source.
#[derive(Debug, Clone)]
pub struct InMemoryReleaseConfigSource {
    configs: Arc<RwLock<BTreeMap<ReleaseKey, ReleaseConfig>>>,
    events: broadcast::Sender<ReleaseConfigEvent>,
}

impl Default for InMemoryReleaseConfigSource {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            configs: Arc::new(RwLock::new(BTreeMap::new())),
            events,
        }
    }
}

impl InMemoryReleaseConfigSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a resource and emits `Added` or `Updated`.
    ///
    /// # Errors
    ///
    /// Returns an error when the resource key is malformed.
    pub fn upsert(&self, config: ReleaseConfig) -> ReleaseConfigSourceResult<()> {
        let key = config
            .key()
            .map_err(ReleaseConfigSourceError::backend)?;
        let previous = self
            .configs
            .write()
            .map_err(|err| {
                ReleaseConfigSourceError::backend(std::io::Error::other(err.to_string()))
            })?
            .insert(key, config.clone());
        let event = previous.map_or_else(
            || ReleaseConfigEvent::Added(config.clone()),
            |old| ReleaseConfigEvent::Updated {
                old,
                new: config.clone(),
            },
        );
        self.notify(event);
        Ok(())
    }

    /// Removes a resource and emits `Deleted` when it existed.
    ///
    /// # Errors
    ///
    /// Returns an error when the store lock is poisoned.
    pub fn remove(&self, key: &ReleaseKey) -> ReleaseConfigSourceResult<()> {
        let removed = self
            .configs
            .write()
            .map_err(|err| {
                ReleaseConfigSourceError::backend(std::io::Error::other(err.to_string()))
            })?
            .remove(key);
        if let Some(config) = removed {
            self.notify(ReleaseConfigEvent::Deleted(config));
        }
        Ok(())
    }

    fn notify(&self, event: ReleaseConfigEvent) {
        if self.events.send(event).is_err() {
            debug!("release config change has no subscribers");
        }
    }
}

#[async_trait]
impl ReleaseConfigSource for InMemoryReleaseConfigSource {
    async fn list_release_configs(&self) -> ReleaseConfigSourceResult<Vec<ReleaseConfig>> {
        let configs = self.configs.read().map_err(|err| {
            ReleaseConfigSourceError::backend(std::io::Error::other(err.to_string()))
        })?;
        Ok(configs.values().cloned().collect())
    }

    async fn get_release_config(
        &self,
        key: &ReleaseKey,
    ) -> ReleaseConfigSourceResult<Option<ReleaseConfig>> {
        let configs = self.configs.read().map_err(|err| {
            ReleaseConfigSourceError::backend(std::io::Error::other(err.to_string()))
        })?;
        Ok(configs.get(key).cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<ReleaseConfigEvent> {
        self.events.subscribe()
    }
}
