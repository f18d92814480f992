//! Typed access to the three read-cache maps.

use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use thiserror::Error;

use crate::release::{
    domain::{ProjectTask, ReleaseCache, ReleaseKey, ReleaseTask, field_name},
    ports::{CacheMap, CacheStore, CacheStoreError},
};

/// Errors returned by [`StateCache`].
#[derive(Debug, Error)]
pub enum StateCacheError {
    /// The record does not exist.
    #[error("{map} record {field} not found")]
    NotFound {
        /// Map that was read.
        map: CacheMap,
        /// Field that was missing.
        field: String,
    },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] CacheStoreError),

    /// A record could not be encoded or decoded.
    #[error("malformed cache record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StateCacheError {
    /// Returns `true` when the record was absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for [`StateCache`] operations.
pub type StateCacheResult<T> = Result<T, StateCacheError>;

/// Key-value projection of release caches, project groupings, and
/// per-release task pointers.
pub struct StateCache<S: CacheStore> {
    store: Arc<S>,
}

impl<S: CacheStore> Clone for StateCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

fn namespace_prefix(namespace: Option<&str>) -> String {
    namespace.map_or_else(String::new, |ns| format!("{ns}/"))
}

impl<S: CacheStore> StateCache<S> {
    /// Creates a cache over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn get_record<T: DeserializeOwned>(
        &self,
        map: CacheMap,
        field: String,
    ) -> StateCacheResult<T> {
        let raw = self.store.get_field(map, &field).await?;
        let Some(value) = raw else {
            return Err(StateCacheError::NotFound { map, field });
        };
        Ok(serde_json::from_str(&value)?)
    }

    async fn set_record<T: Serialize + Sync>(
        &self,
        map: CacheMap,
        field: String,
        record: &T,
    ) -> StateCacheResult<()> {
        let value = serde_json::to_string(record)?;
        self.store.set_fields(map, vec![(field, value)]).await?;
        Ok(())
    }

    async fn delete_record(&self, map: CacheMap, field: String) -> StateCacheResult<()> {
        self.store.delete_fields(map, &[field]).await?;
        Ok(())
    }

    async fn list_records<T: DeserializeOwned>(
        &self,
        map: CacheMap,
        namespace: Option<&str>,
    ) -> StateCacheResult<Vec<T>> {
        let entries = self.store.scan(map, &namespace_prefix(namespace)).await?;
        entries
            .iter()
            .map(|(_, value)| serde_json::from_str(value).map_err(StateCacheError::from))
            .collect()
    }

    /// Reads a release cache record.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError::NotFound`] when the release is not cached.
    pub async fn get_release_cache(&self, key: &ReleaseKey) -> StateCacheResult<ReleaseCache> {
        self.get_record(CacheMap::Releases, key.field_name()).await
    }

    /// Reads several release cache records, skipping absent ones.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store or decoding failure.
    pub async fn get_release_caches(
        &self,
        keys: &[ReleaseKey],
    ) -> StateCacheResult<Vec<ReleaseCache>> {
        let fields: Vec<String> = keys.iter().map(ReleaseKey::field_name).collect();
        let values = self.store.get_fields(CacheMap::Releases, &fields).await?;
        values
            .iter()
            .flatten()
            .map(|value| serde_json::from_str(value).map_err(StateCacheError::from))
            .collect()
    }

    /// Lists release cache records, optionally restricted to one namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store or decoding failure.
    pub async fn list_release_caches(
        &self,
        namespace: Option<&str>,
    ) -> StateCacheResult<Vec<ReleaseCache>> {
        self.list_records(CacheMap::Releases, namespace).await
    }

    /// Writes a release cache record.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store or encoding failure.
    pub async fn set_release_cache(&self, release: &ReleaseCache) -> StateCacheResult<()> {
        self.set_record(CacheMap::Releases, release.field_name(), release)
            .await
    }

    /// Removes a release cache record; absent records are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store failure.
    pub async fn delete_release_cache(&self, key: &ReleaseKey) -> StateCacheResult<()> {
        self.delete_record(CacheMap::Releases, key.field_name()).await
    }

    /// Reads a release task record.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError::NotFound`] when no task record exists.
    pub async fn get_release_task(&self, key: &ReleaseKey) -> StateCacheResult<ReleaseTask> {
        self.get_record(CacheMap::ReleaseTasks, key.field_name())
            .await
    }

    /// Lists release task records, optionally restricted to one namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store or decoding failure.
    pub async fn list_release_tasks(
        &self,
        namespace: Option<&str>,
    ) -> StateCacheResult<Vec<ReleaseTask>> {
        self.list_records(CacheMap::ReleaseTasks, namespace).await
    }

    /// Writes a release task record.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store or encoding failure.
    pub async fn set_release_task(&self, task: &ReleaseTask) -> StateCacheResult<()> {
        let field = field_name(task.namespace(), task.name());
        self.set_record(CacheMap::ReleaseTasks, field, task).await
    }

    /// Removes a release task record; absent records are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store failure.
    pub async fn delete_release_task(&self, key: &ReleaseKey) -> StateCacheResult<()> {
        self.delete_record(CacheMap::ReleaseTasks, key.field_name())
            .await
    }

    /// Reads a project record.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError::NotFound`] when the project is not cached.
    pub async fn get_project_task(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateCacheResult<ProjectTask> {
        self.get_record(CacheMap::Projects, field_name(namespace, name))
            .await
    }

    /// Lists project records, optionally restricted to one namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store or decoding failure.
    pub async fn list_project_tasks(
        &self,
        namespace: Option<&str>,
    ) -> StateCacheResult<Vec<ProjectTask>> {
        self.list_records(CacheMap::Projects, namespace).await
    }

    /// Writes a project record.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store or encoding failure.
    pub async fn set_project_task(&self, project: &ProjectTask) -> StateCacheResult<()> {
        let field = field_name(project.namespace(), project.name());
        self.set_record(CacheMap::Projects, field, project).await
    }

    /// Removes a project record; absent records are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StateCacheError`] on store failure.
    pub async fn delete_project_task(&self, namespace: &str, name: &str) -> StateCacheResult<()> {
        self.delete_record(CacheMap::Projects, field_name(namespace, name))
            .await
    }
}
