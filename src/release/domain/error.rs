//! Error types for release domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing or parsing release domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReleaseDomainError {
    /// The value is not a valid `namespace/name` release key.
    #[error("invalid release key '{0}', expected [namespace/]name")]
    InvalidReleaseKey(String),

    /// A dependency edge contains more than one `/`.
    #[error("depended release {0} is not valid: only 1 or 0 \"/\" is allowed")]
    InvalidDependency(String),

    /// The release name is empty after trimming.
    #[error("release name can not be empty")]
    EmptyReleaseName,

    /// Neither a chart name nor a chart image was supplied.
    #[error("release {0} needs at least one of chart name or chart image")]
    MissingChartSource(String),
}
