//! Per-release and per-project task pointer records.

use super::{ReleaseDomainError, ReleaseKey, TaskSignature};
use serde::{Deserialize, Serialize};

/// Records that carry the latest dispatched signature for their key.
pub trait TaskRecord {
    /// Returns the canonical read-cache field name.
    fn field_name(&self) -> String;

    /// Returns the most recently dispatched signature, if any.
    fn latest_signature(&self) -> Option<&TaskSignature>;
}

/// Pointer from a release to its most recently dispatched task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTask {
    namespace: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latest_signature: Option<TaskSignature>,
}

impl ReleaseTask {
    /// Creates a placeholder record without a signature.
    #[must_use]
    pub fn placeholder(key: &ReleaseKey) -> Self {
        Self {
            namespace: key.namespace().to_owned(),
            name: key.name().to_owned(),
            latest_signature: None,
        }
    }

    /// Creates a record pointing at `signature`.
    #[must_use]
    pub fn with_signature(key: &ReleaseKey, signature: TaskSignature) -> Self {
        Self {
            latest_signature: Some(signature),
            ..Self::placeholder(key)
        }
    }

    /// Returns the release key.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseDomainError`] when the stored identity is malformed.
    pub fn key(&self) -> Result<ReleaseKey, ReleaseDomainError> {
        ReleaseKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the release name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TaskRecord for ReleaseTask {
    fn field_name(&self) -> String {
        field_name(&self.namespace, &self.name)
    }

    fn latest_signature(&self) -> Option<&TaskSignature> {
        self.latest_signature.as_ref()
    }
}

/// Grouping of releases sharing a project label, with its latest task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTask {
    namespace: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latest_signature: Option<TaskSignature>,
}

impl ProjectTask {
    /// Creates a placeholder project record.
    #[must_use]
    pub fn placeholder(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            latest_signature: None,
        }
    }

    /// Attaches the latest project-level signature.
    #[must_use]
    pub fn with_signature(mut self, signature: TaskSignature) -> Self {
        self.latest_signature = Some(signature);
        self
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TaskRecord for ProjectTask {
    fn field_name(&self) -> String {
        field_name(&self.namespace, &self.name)
    }

    fn latest_signature(&self) -> Option<&TaskSignature> {
        self.latest_signature.as_ref()
    }
}

/// Builds the canonical `namespace/name` field name.
#[must_use]
pub fn field_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_owned()
    } else {
        format!("{namespace}/{name}")
    }
}
