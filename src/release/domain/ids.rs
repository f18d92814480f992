//! Release identity and dependency edge parsing.

use super::ReleaseDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of a release: `(namespace, name)`.
///
/// The canonical string form `namespace/name` is used as the field name in
/// every read-cache map and as the work queue item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReleaseKey {
    namespace: String,
    name: String,
}

impl ReleaseKey {
    /// Creates a validated release key.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseDomainError::EmptyReleaseName`] when the name is empty
    /// and [`ReleaseDomainError::InvalidReleaseKey`] when either part contains
    /// a `/`.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ReleaseDomainError> {
        let namespace_value = namespace.into();
        let name_value = name.into();
        if name_value.trim().is_empty() {
            return Err(ReleaseDomainError::EmptyReleaseName);
        }
        if namespace_value.contains('/') || name_value.contains('/') {
            return Err(ReleaseDomainError::InvalidReleaseKey(format!(
                "{namespace_value}/{name_value}"
            )));
        }
        Ok(Self {
            namespace: namespace_value,
            name: name_value,
        })
    }

    /// Parses a canonical `namespace/name` key. A bare `name` has an empty
    /// namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseDomainError::InvalidReleaseKey`] when the key has more
    /// than one `/` or an empty name.
    pub fn parse(key: &str) -> Result<Self, ReleaseDomainError> {
        let invalid = || ReleaseDomainError::InvalidReleaseKey(key.to_owned());
        let mut parts = key.split('/');
        let first = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => Self::new("", first).map_err(|_| invalid()),
            (Some(name), None) => Self::new(first, name).map_err(|_| invalid()),
            (Some(_), Some(_)) => Err(invalid()),
        }
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

    /// Returns the canonical read-cache field name.
    #[must_use]
    pub fn field_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Resolves a dependency edge declared by a release in `calling_namespace`.
///
/// `"name"` resolves to `(calling_namespace, name)` and `"ns/name"` to
/// `(ns, name)`.
///
/// # Errors
///
/// Returns [`ReleaseDomainError::InvalidDependency`] when the edge contains
/// more than one `/` or resolves to an empty name.
pub fn resolve_dependency(
    calling_namespace: &str,
    dependency: &str,
) -> Result<ReleaseKey, ReleaseDomainError> {
    let invalid = || ReleaseDomainError::InvalidDependency(dependency.to_owned());
    let mut parts = dependency.split('/');
    let first = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (None, _) => ReleaseKey::new(calling_namespace, first).map_err(|_| invalid()),
        (Some(name), None) => ReleaseKey::new(first, name).map_err(|_| invalid()),
        (Some(_), Some(_)) => Err(invalid()),
    }
}
