//! Hash-map style read-cache store with optimistic transactions.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for cache store operations.
pub type CacheStoreResult<T> = Result<T, CacheStoreError>;

/// The three top-level maps of the read cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheMap {
    /// Release cache records.
    Releases,
    /// Project grouping records.
    Projects,
    /// Per-release task pointers.
    ReleaseTasks,
}

impl CacheMap {
    /// Every map, in a stable order.
    pub const ALL: [Self; 3] = [Self::Releases, Self::Projects, Self::ReleaseTasks];

    /// Returns the store key of the map.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Releases => "release-cache",
            Self::Projects => "project-cache",
            Self::ReleaseTasks => "release-task",
        }
    }
}

impl fmt::Display for CacheMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Something a transaction can watch: a whole map or one field of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    /// Any write to the map aborts the transaction.
    Map(CacheMap),
    /// Only writes to this field abort the transaction.
    Field(CacheMap, String),
}

/// Versions observed when a watch was opened.
///
/// Adapters decide what a version is; callers treat the token as opaque and
/// hand it back to [`CacheStore::exec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchToken {
    observed: Vec<(WatchKey, u64)>,
}

impl WatchToken {
    /// Creates a token from observed versions.
    #[must_use]
    pub const fn new(observed: Vec<(WatchKey, u64)>) -> Self {
        Self { observed }
    }

    /// Returns the observed versions.
    #[must_use]
    pub fn observed(&self) -> &[(WatchKey, u64)] {
        &self.observed
    }
}

/// One write queued inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheWrite {
    /// Sets `field` of `map` to `value`.
    Set {
        /// Target map.
        map: CacheMap,
        /// Field name.
        field: String,
        /// Serialized record.
        value: String,
    },
    /// Removes `field` from `map`.
    Delete {
        /// Target map.
        map: CacheMap,
        /// Field name.
        field: String,
    },
}

impl CacheWrite {
    /// Builds a set operation.
    pub fn set(map: CacheMap, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            map,
            field: field.into(),
            value: value.into(),
        }
    }

    /// Builds a delete operation.
    pub fn delete(map: CacheMap, field: impl Into<String>) -> Self {
        Self::Delete {
            map,
            field: field.into(),
        }
    }
}

/// Read-cache store contract.
///
/// Point operations are atomic per call. Multi-key consistency is only
/// available through [`CacheStore::watch`] followed by [`CacheStore::exec`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads one field.
    async fn get_field(&self, map: CacheMap, field: &str) -> CacheStoreResult<Option<String>>;

    /// Reads several fields; the result is positionally aligned with `fields`.
    async fn get_fields(
        &self,
        map: CacheMap,
        fields: &[String],
    ) -> CacheStoreResult<Vec<Option<String>>>;

    /// Returns every `(field, value)` whose field starts with `prefix`.
    async fn scan(&self, map: CacheMap, prefix: &str) -> CacheStoreResult<Vec<(String, String)>>;

    /// Returns every `(field, value)` of a map.
    async fn get_all(&self, map: CacheMap) -> CacheStoreResult<Vec<(String, String)>> {
        self.scan(map, "").await
    }

    /// Writes several fields at once.
    async fn set_fields(&self, map: CacheMap, entries: Vec<(String, String)>)
    -> CacheStoreResult<()>;

    /// Removes several fields; absent fields are ignored.
    async fn delete_fields(&self, map: CacheMap, fields: &[String]) -> CacheStoreResult<()>;

    /// Starts an optimistic transaction over `keys`.
    async fn watch(&self, keys: &[WatchKey]) -> CacheStoreResult<WatchToken>;

    /// Applies `writes` atomically if nothing watched by `token` changed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheStoreError::TransactionConflict`] when a watched key was
    /// written after the watch was opened; no write is applied in that case.
    async fn exec(&self, token: WatchToken, writes: Vec<CacheWrite>) -> CacheStoreResult<()>;
}

/// Errors returned by cache store implementations.
#[derive(Debug, Clone, Error)]
pub enum CacheStoreError {
    /// A watched key changed before the transaction executed.
    #[error("transaction aborted: a watched key was modified")]
    TransactionConflict,

    /// Backend failure.
    #[error("cache store error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl CacheStoreError {
    /// Wraps a backend failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }

    /// Returns `true` for an optimistic-concurrency abort.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::TransactionConflict)
    }
}
