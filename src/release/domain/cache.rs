//! Rendered release snapshots stored in the read cache.

use super::{ConfigValues, ReleaseDomainError, ReleaseKey, ReleaseRequest, task::field_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of a release's rendered state, produced by the chart manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseCache {
    /// Release namespace.
    pub namespace: String,
    /// Release name.
    pub name: String,
    /// Revision number; higher is newer.
    pub version: u32,
    /// Chart repository name.
    pub repo_name: String,
    /// Chart name.
    pub chart_name: String,
    /// Chart version.
    pub chart_version: String,
    /// Chart application version.
    pub chart_app_version: String,
    /// Chart image reference.
    pub chart_image: String,
    /// User config values.
    pub config_values: ConfigValues,
    /// Dependency edges: alias to `"[namespace/]name"`.
    pub dependencies: BTreeMap<String, String>,
    /// Config values injected from dependencies' output configs.
    pub dependencies_config_values: ConfigValues,
    /// Configuration this release publishes.
    pub output_config: ConfigValues,
    /// Values the templates were rendered with.
    pub computed_values: ConfigValues,
    /// Release labels.
    pub release_labels: BTreeMap<String, String>,
    /// Whether the release workloads are paused.
    pub paused: bool,
    /// Resources rendered for this release.
    pub resource_metas: Vec<ReleaseResourceMeta>,
    /// Rendered manifest.
    pub manifest: String,
}

/// Reference to one cluster resource owned by a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseResourceMeta {
    /// Resource kind.
    pub kind: String,
    /// Resource namespace.
    pub namespace: String,
    /// Resource name.
    pub name: String,
}

impl ReleaseCache {
    /// Returns the release key.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseDomainError`] when namespace or name are malformed.
    pub fn key(&self) -> Result<ReleaseKey, ReleaseDomainError> {
        ReleaseKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Returns the canonical read-cache field name.
    #[must_use]
    pub fn field_name(&self) -> String {
        field_name(&self.namespace, &self.name)
    }

    /// Rebuilds the request that reproduces this release.
    #[must_use]
    pub fn to_request(&self) -> ReleaseRequest {
        ReleaseRequest {
            name: self.name.clone(),
            repo_name: self.repo_name.clone(),
            chart_name: self.chart_name.clone(),
            chart_version: self.chart_version.clone(),
            chart_image: self.chart_image.clone(),
            config_values: self.config_values.clone(),
            dependencies: self.dependencies.clone(),
            release_labels: self.release_labels.clone(),
        }
    }
}
