//! Dependency-declaring resources and config value comparison.

use super::{ReleaseDomainError, ReleaseKey, ResourceState, resolve_dependency};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Free-form JSON object of configuration values.
pub type ConfigValues = Map<String, Value>;

/// Label carrying the project a release belongs to.
pub const PROJECT_NAME_LABEL: &str = "Project-Name";

/// Resource kind reported for dependency-declaring resources.
pub const RELEASE_CONFIG_KIND: &str = "ReleaseConfig";

/// Dependency-declaring resource written as a side effect of rendering a
/// release. The controller only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Resource namespace.
    pub namespace: String,
    /// Resource name; equal to the release name.
    pub name: String,
    /// Resource labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Declared dependencies and published configuration.
    #[serde(default)]
    pub spec: ReleaseConfigSpec,
    /// Readiness reported for the resource.
    #[serde(default)]
    pub state: ResourceState,
}

/// Specification block of a [`ReleaseConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseConfigSpec {
    /// Dependency edges: alias to `"[namespace/]name"`.
    pub dependencies: BTreeMap<String, String>,
    /// User config values applied to the chart.
    pub config_values: Option<ConfigValues>,
    /// Config values injected from dependencies' output configs.
    pub dependencies_config_values: Option<ConfigValues>,
    /// Configuration this release publishes to its dependents.
    pub output_config: Option<ConfigValues>,
    /// Chart name.
    pub chart_name: String,
    /// Chart version.
    pub chart_version: String,
    /// Chart application version.
    pub chart_app_version: String,
    /// Chart repository.
    pub repo: String,
    /// Chart image reference.
    pub chart_image: String,
}

impl ReleaseConfig {
    /// Creates a resource with an empty spec.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            spec: ReleaseConfigSpec::default(),
            state: ResourceState::default(),
        }
    }

    /// Adds a dependency edge.
    #[must_use]
    pub fn with_dependency(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.spec.dependencies.insert(alias.into(), target.into());
        self
    }

    /// Sets the published output config.
    #[must_use]
    pub fn with_output_config(mut self, output_config: ConfigValues) -> Self {
        self.spec.output_config = Some(output_config);
        self
    }

    /// Sets the reported readiness.
    #[must_use]
    pub fn with_state(mut self, state: ResourceState) -> Self {
        self.state = state;
        self
    }

    /// Sets a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the release key of this resource.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseDomainError`] when namespace or name are malformed.
    pub fn key(&self) -> Result<ReleaseKey, ReleaseDomainError> {
        ReleaseKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Returns the project this release is labelled with.
    #[must_use]
    pub fn project_name(&self) -> Option<&str> {
        self.labels.get(PROJECT_NAME_LABEL).map(String::as_str)
    }

    /// Resolves every dependency edge against this resource's namespace.
    ///
    /// Invalid edges are returned as errors so callers can report them.
    pub fn resolved_dependencies(
        &self,
    ) -> impl Iterator<Item = (&str, Result<ReleaseKey, ReleaseDomainError>)> {
        self.spec
            .dependencies
            .iter()
            .map(|(alias, target)| (alias.as_str(), resolve_dependency(&self.namespace, target)))
    }
}

/// Returns `true` when two config value sets differ in content.
///
/// `None` and an empty object are considered equal.
#[must_use]
pub fn config_values_differ(left: Option<&ConfigValues>, right: Option<&ConfigValues>) -> bool {
    let left_empty = left.is_none_or(Map::is_empty);
    let right_empty = right.is_none_or(Map::is_empty);
    if left_empty && right_empty {
        return false;
    }
    left != right
}
