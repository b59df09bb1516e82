//! Error types shared across the crate.

use crate::host::{SurfaceId, ViewId};
use crate::overlay::OverlayId;

/// Result alias used by fallible keylayer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed declarative input, raised while building an overlay.
///
/// `field` is a path into the declaration (for example
/// `overlay[2].options.silent`) so the message points at the offending entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid overlay declaration at `{field}`: {message}")]
pub struct ValidationError {
    /// Path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for `field`.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A host collaborator call failed.
///
/// These are recovered locally: the entry that failed is skipped and a
/// warning is emitted, the rest of the operation carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The surface disappeared between listing and use.
    #[error("surface {0} is gone")]
    SurfaceGone(SurfaceId),
    /// The view disappeared between listing and use.
    #[error("view {0} is gone")]
    ViewGone(ViewId),
    /// The host refused the operation.
    #[error("host rejected operation: {0}")]
    Rejected(String),
}

/// Errors returned by the public keylayer API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The overlay declaration is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A JSON declaration could not be parsed.
    #[error("failed to parse overlay declaration: {0}")]
    Parse(#[from] serde_json::Error),
    /// No overlay with this id is registered with the controller.
    #[error("unknown overlay {0}")]
    UnknownOverlay(OverlayId),
    /// A host call failed where no local recovery was possible.
    #[error(transparent)]
    Host(#[from] HostError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_the_field() {
        let err = ValidationError::new("overlay[0].options.silent", "expected a boolean");
        assert_eq!(
            err.to_string(),
            "invalid overlay declaration at `overlay[0].options.silent`: expected a boolean"
        );
    }

    #[test]
    fn validation_converts_into_error() {
        let err: Error = ValidationError::new("entrance[1].trigger", "empty trigger").into();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("entrance[1].trigger"));
    }

    #[test]
    fn host_error_display() {
        assert_eq!(HostError::SurfaceGone(SurfaceId(4)).to_string(), "surface 4 is gone");
    }
}
