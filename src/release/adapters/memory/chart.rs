//! In-memory chart manager keeping every release revision.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::InMemoryReleaseConfigSource;
use crate::release::{
    domain::{ConfigValues, ReleaseCache, ReleaseConfig, ReleaseKey, ReleaseRequest},
    ports::{ChartManager, ChartManagerError, ChartManagerResult},
};

/// Thread-safe in-memory chart manager.
///
/// Each install or upgrade appends a revision. Rendering publishes the
/// request's config values as the release's output config. When attached to
/// an [`InMemoryReleaseConfigSource`], rendering also writes the matching
/// dependency-declaring resource, and deletion removes it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChartManager {
    state: Arc<RwLock<ChartState>>,
    configs: Option<InMemoryReleaseConfigSource>,
}

#[derive(Debug, Default)]
struct ChartState {
    revisions: BTreeMap<ReleaseKey, Vec<ReleaseCache>>,
    install_count: usize,
}

fn lock_error(err: impl std::fmt::Display) -> ChartManagerError {
    ChartManagerError::backend(std::io::Error::other(err.to_string()))
}

fn merged_values(config_values: &ConfigValues, injected: &ConfigValues) -> ConfigValues {
    let mut merged = injected.clone();
    for (key, value) in config_values {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

impl InMemoryChartManager {
    /// Creates an empty chart manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chart manager that mirrors releases into `configs`.
    #[must_use]
    pub fn with_release_configs(configs: InMemoryReleaseConfigSource) -> Self {
        Self {
            state: Arc::default(),
            configs: Some(configs),
        }
    }

    /// Records an existing revision without rendering anything.
    ///
    /// # Errors
    ///
    /// Returns an error when the release key is malformed.
    pub fn insert_revision(&self, release: ReleaseCache) -> ChartManagerResult<()> {
        let key = release.key().map_err(ChartManagerError::backend)?;
        let mut state = self.state.write().map_err(lock_error)?;
        state.revisions.entry(key).or_default().push(release);
        Ok(())
    }

    /// Returns how many install or upgrade calls were served.
    #[must_use]
    pub fn install_count(&self) -> usize {
        self.state
            .read()
            .map(|state| state.install_count)
            .unwrap_or_default()
    }

    /// Returns the newest revision of a release.
    #[must_use]
    pub fn latest(&self, key: &ReleaseKey) -> Option<ReleaseCache> {
        self.state
            .read()
            .ok()?
            .revisions
            .get(key)
            .and_then(|history| history.iter().max_by_key(|release| release.version))
            .cloned()
    }

    fn mirror(&self, release: &ReleaseCache) -> ChartManagerResult<()> {
        let Some(configs) = &self.configs else {
            return Ok(());
        };
        let mut config = ReleaseConfig::new(release.namespace.clone(), release.name.clone());
        config.labels = release.release_labels.clone();
        config.spec.dependencies = release.dependencies.clone();
        config.spec.config_values = Some(release.config_values.clone());
        config.spec.dependencies_config_values = Some(release.dependencies_config_values.clone());
        config.spec.output_config = Some(release.output_config.clone());
        config.spec.chart_name = release.chart_name.clone();
        config.spec.chart_version = release.chart_version.clone();
        config.spec.chart_app_version = release.chart_app_version.clone();
        config.spec.repo = release.repo_name.clone();
        config.spec.chart_image = release.chart_image.clone();
        configs.upsert(config).map_err(ChartManagerError::backend)
    }
}

#[async_trait]
impl ChartManager for InMemoryChartManager {
    async fn list_all_releases(&self) -> ChartManagerResult<Vec<ReleaseCache>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.revisions.values().flatten().cloned().collect())
    }

    async fn install_or_upgrade(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
        dependencies_config_values: &ConfigValues,
        paused: bool,
    ) -> ChartManagerResult<ReleaseCache> {
        let key = ReleaseKey::new(namespace, request.name.clone()).map_err(|err| {
            ChartManagerError::InvalidChart {
                release: format!("{namespace}/{}", request.name),
                reason: err.to_string(),
            }
        })?;
        if request.chart_name.is_empty() && request.chart_image.is_empty() {
            return Err(ChartManagerError::InvalidChart {
                release: key.to_string(),
                reason: "neither chart name nor chart image is set".to_owned(),
            });
        }
        let release = {
            let mut state = self.state.write().map_err(lock_error)?;
            state.install_count += 1;
            let history = state.revisions.entry(key).or_default();
            let version = history
                .iter()
                .map(|revision| revision.version)
                .max()
                .unwrap_or_default()
                + 1;
            let revision = ReleaseCache {
                namespace: namespace.to_owned(),
                name: request.name.clone(),
                version,
                repo_name: request.repo_name.clone(),
                chart_name: request.chart_name.clone(),
                chart_version: request.chart_version.clone(),
                chart_app_version: request.chart_version.clone(),
                chart_image: request.chart_image.clone(),
                config_values: request.config_values.clone(),
                dependencies: request.dependencies.clone(),
                dependencies_config_values: dependencies_config_values.clone(),
                output_config: request.config_values.clone(),
                computed_values: merged_values(&request.config_values, dependencies_config_values),
                release_labels: request.release_labels.clone(),
                paused,
                resource_metas: Vec::new(),
                manifest: Value::Object(request.config_values.clone()).to_string(),
            };
            history.push(revision.clone());
            revision
        };
        self.mirror(&release)?;
        Ok(release)
    }

    async fn delete_release(
        &self,
        namespace: &str,
        name: &str,
        _delete_pvcs: bool,
    ) -> ChartManagerResult<()> {
        let key = ReleaseKey::new(namespace, name)
            .map_err(|_| ChartManagerError::NotFound(format!("{namespace}/{name}")))?;
        let removed = self.state.write().map_err(lock_error)?.revisions.remove(&key);
        if removed.is_none() {
            return Err(ChartManagerError::NotFound(key.to_string()));
        }
        if let Some(configs) = &self.configs {
            configs.remove(&key).map_err(ChartManagerError::backend)?;
        }
        Ok(())
    }
}
