//! In-memory read-cache store with versioned optimistic transactions.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::release::ports::{
    CacheMap, CacheStore, CacheStoreError, CacheStoreResult, CacheWrite, WatchKey, WatchToken,
};

/// Thread-safe in-memory cache store.
///
/// Every write bumps a global revision and stamps it on the written map and
/// field; [`CacheStore::exec`] aborts when any watched stamp moved.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    state: Arc<RwLock<InMemoryStoreState>>,
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    maps: BTreeMap<CacheMap, BTreeMap<String, String>>,
    revision: u64,
    map_revisions: HashMap<CacheMap, u64>,
    field_revisions: HashMap<(CacheMap, String), u64>,
    write_count: u64,
    injected_conflicts: u32,
}

impl InMemoryStoreState {
    fn map(&self, map: CacheMap) -> Option<&BTreeMap<String, String>> {
        self.maps.get(&map)
    }

    fn stamp(&mut self, map: CacheMap, field: &str) {
        self.revision += 1;
        self.map_revisions.insert(map, self.revision);
        self.field_revisions
            .insert((map, field.to_owned()), self.revision);
        self.write_count += 1;
    }

    fn observed(&self, key: &WatchKey) -> u64 {
        match key {
            WatchKey::Map(map) => self.map_revisions.get(map).copied().unwrap_or_default(),
            WatchKey::Field(map, field) => self
                .field_revisions
                .get(&(*map, field.clone()))
                .copied()
                .unwrap_or_default(),
        }
    }

    fn set(&mut self, map: CacheMap, field: String, value: String) {
        self.stamp(map, &field);
        self.maps.entry(map).or_default().insert(field, value);
    }

    fn delete(&mut self, map: CacheMap, field: &str) {
        let removed = self
            .maps
            .get_mut(&map)
            .and_then(|entries| entries.remove(field));
        if removed.is_some() {
            self.stamp(map, field);
        }
    }
}

impl InMemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many field writes and deletions have been applied.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state
            .read()
            .map(|state| state.write_count)
            .unwrap_or_default()
    }

    /// Makes the next `count` calls to `exec` fail with a transaction
    /// conflict.
    pub fn inject_conflicts(&self, count: u32) {
        if let Ok(mut state) = self.state.write() {
            state.injected_conflicts = count;
        }
    }

    fn read_state(
        &self,
    ) -> CacheStoreResult<std::sync::RwLockReadGuard<'_, InMemoryStoreState>> {
        self.state
            .read()
            .map_err(|err| CacheStoreError::backend(std::io::Error::other(err.to_string())))
    }

    fn write_state(
        &self,
    ) -> CacheStoreResult<std::sync::RwLockWriteGuard<'_, InMemoryStoreState>> {
        self.state
            .write()
            .map_err(|err| CacheStoreError::backend(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get_field(&self, map: CacheMap, field: &str) -> CacheStoreResult<Option<String>> {
        let state = self.read_state()?;
        Ok(state.map(map).and_then(|entries| entries.get(field)).cloned())
    }

    async fn get_fields(
        &self,
        map: CacheMap,
        fields: &[String],
    ) -> CacheStoreResult<Vec<Option<String>>> {
        let state = self.read_state()?;
        let entries = state.map(map);
        Ok(fields
            .iter()
            .map(|field| entries.and_then(|values| values.get(field)).cloned())
            .collect())
    }

    async fn scan(&self, map: CacheMap, prefix: &str) -> CacheStoreResult<Vec<(String, String)>> {
        let state = self.read_state()?;
        Ok(state
            .map(map)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(field, _)| field.starts_with(prefix))
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_fields(
        &self,
        map: CacheMap,
        entries: Vec<(String, String)>,
    ) -> CacheStoreResult<()> {
        let mut state = self.write_state()?;
        for (field, value) in entries {
            state.set(map, field, value);
        }
        Ok(())
    }

    async fn delete_fields(&self, map: CacheMap, fields: &[String]) -> CacheStoreResult<()> {
        let mut state = self.write_state()?;
        for field in fields {
            state.delete(map, field);
        }
        Ok(())
    }

    async fn watch(&self, keys: &[WatchKey]) -> CacheStoreResult<WatchToken> {
        let state = self.read_state()?;
        Ok(WatchToken::new(
            keys.iter()
                .map(|key| (key.clone(), state.observed(key)))
                .collect(),
        ))
    }

    async fn exec(&self, token: WatchToken, writes: Vec<CacheWrite>) -> CacheStoreResult<()> {
        let mut state = self.write_state()?;
        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            return Err(CacheStoreError::TransactionConflict);
        }
        let changed = token
            .observed()
            .iter()
            .any(|(key, revision)| state.observed(key) != *revision);
        if changed {
            return Err(CacheStoreError::TransactionConflict);
        }
        for write in writes {
            match write {
                CacheWrite::Set { map, field, value } => state.set(map, field, value),
                CacheWrite::Delete { map, field } => state.delete(map, &field),
            }
        }
        Ok(())
    }
}
