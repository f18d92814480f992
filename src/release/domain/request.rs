//! Release requests and the argument payloads of release operations.

use super::{ConfigValues, ReleaseDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operation name of the install-or-upgrade task.
pub const CREATE_RELEASE_TASK: &str = "Create-Release-Task";

/// Operation name of the delete task.
pub const DELETE_RELEASE_TASK: &str = "Delete-Release-Task";

/// Desired state of a release as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseRequest {
    /// Release name.
    pub name: String,
    /// Chart repository name.
    pub repo_name: String,
    /// Chart name.
    pub chart_name: String,
    /// Chart version.
    pub chart_version: String,
    /// Chart image reference.
    pub chart_image: String,
    /// User config values.
    pub config_values: ConfigValues,
    /// Dependency edges: alias to `"[namespace/]name"`.
    pub dependencies: BTreeMap<String, String>,
    /// Release labels.
    pub release_labels: BTreeMap<String, String>,
}

impl ReleaseRequest {
    /// Creates a request for `name` rendered from `chart_name`.
    #[must_use]
    pub fn new(name: impl Into<String>, chart_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart_name: chart_name.into(),
            ..Self::default()
        }
    }

    /// Sets the user config values.
    #[must_use]
    pub fn with_config_values(mut self, config_values: ConfigValues) -> Self {
        self.config_values = config_values;
        self
    }

    /// Adds a dependency edge.
    #[must_use]
    pub fn with_dependency(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.dependencies.insert(alias.into(), target.into());
        self
    }

    /// Adds a release label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.release_labels.insert(key.into(), value.into());
        self
    }

    /// Checks that the request names a release and a chart source.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseDomainError::EmptyReleaseName`] or
    /// [`ReleaseDomainError::MissingChartSource`].
    pub fn validate(&self) -> Result<(), ReleaseDomainError> {
        if self.name.trim().is_empty() {
            return Err(ReleaseDomainError::EmptyReleaseName);
        }
        if self.chart_name.is_empty() && self.chart_image.is_empty() {
            return Err(ReleaseDomainError::MissingChartSource(self.name.clone()));
        }
        Ok(())
    }
}

/// Arguments of [`CREATE_RELEASE_TASK`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallReleaseArgs {
    /// Target namespace.
    pub namespace: String,
    /// Desired release state.
    pub request: ReleaseRequest,
    /// `None` keeps the current pause state, `Some` sets it.
    pub paused: Option<bool>,
}

/// Arguments of [`DELETE_RELEASE_TASK`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReleaseArgs {
    /// Release namespace.
    pub namespace: String,
    /// Release name.
    pub release_name: String,
    /// Whether persistent volume claims are removed too.
    pub delete_pvcs: bool,
}
