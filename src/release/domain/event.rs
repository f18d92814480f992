//! Change events published for dependency-declaring resources.

use super::{ConfigValues, RELEASE_CONFIG_KIND, ReleaseConfig, ReleaseKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Topic release config change events are published on.
pub const RELEASE_CONFIG_TOPIC: &str = "release-config";

/// Kind of change carried by a [`ReleaseConfigDeltaEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseConfigDeltaEventType {
    /// The resource exists with the attached data.
    CreateOrUpdate,
    /// The resource is gone.
    Delete,
}

/// Readiness summary of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Status word.
    pub status: String,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

/// Event payload. Downstream consumers rely on field presence: every field
/// is always serialized and unset maps are `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfigEventData {
    /// Resource name.
    pub name: String,
    /// Resource namespace.
    pub namespace: String,
    /// Resource kind.
    pub kind: String,
    /// Resource state.
    pub state: ResourceState,
    /// Resource labels.
    pub labels: Option<BTreeMap<String, String>>,
    /// User config values.
    pub config_values: Option<ConfigValues>,
    /// Dependency-injected config values.
    pub dependencies_config_values: Option<ConfigValues>,
    /// Dependency edges.
    pub dependencies: Option<BTreeMap<String, String>>,
    /// Chart name.
    pub chart_name: String,
    /// Chart version.
    pub chart_version: String,
    /// Chart application version.
    pub chart_app_version: String,
    /// Published output config.
    pub output_config: Option<ConfigValues>,
    /// Chart repository.
    pub repo: String,
    /// Chart image reference.
    pub chart_image: String,
}

/// Structured change event sent to the external event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseConfigDeltaEvent {
    /// Change kind.
    #[serde(rename = "type")]
    pub event_type: ReleaseConfigDeltaEventType,
    /// Resource data.
    pub data: ReleaseConfigEventData,
}

impl ReleaseConfigDeltaEvent {
    /// Builds a `CreateOrUpdate` event from the current resource, carrying
    /// the resource's own state.
    #[must_use]
    pub fn create_or_update(resource: &ReleaseConfig) -> Self {
        let spec = &resource.spec;
        Self {
            event_type: ReleaseConfigDeltaEventType::CreateOrUpdate,
            data: ReleaseConfigEventData {
                name: resource.name.clone(),
                namespace: resource.namespace.clone(),
                kind: RELEASE_CONFIG_KIND.to_owned(),
                state: resource.state.clone(),
                labels: Some(resource.labels.clone()),
                config_values: spec.config_values.clone(),
                dependencies_config_values: spec.dependencies_config_values.clone(),
                dependencies: Some(spec.dependencies.clone()),
                chart_name: spec.chart_name.clone(),
                chart_version: spec.chart_version.clone(),
                chart_app_version: spec.chart_app_version.clone(),
                output_config: spec.output_config.clone(),
                repo: spec.repo.clone(),
                chart_image: spec.chart_image.clone(),
            },
        }
    }

    /// Builds a `Delete` event carrying only the identity of the resource.
    #[must_use]
    pub fn deleted(key: &ReleaseKey) -> Self {
        Self {
            event_type: ReleaseConfigDeltaEventType::Delete,
            data: ReleaseConfigEventData {
                name: key.name().to_owned(),
                namespace: key.namespace().to_owned(),
                ..ReleaseConfigEventData::default()
            },
        }
    }
}
