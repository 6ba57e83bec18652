//! Shadow subsystem errors
//!
//! Setup paths (`init`, `add_generator`, `set_quality`) return these to the
//! caller. Per-frame failures are contained inside the manager and only
//! surface through logs and metrics.

use crate::renderer::light::{LightId, LightType};

/// Errors produced by the shadow subsystem.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShadowError {
    /// A depth/moment texture or framebuffer could not be created.
    #[error("failed to create {label}: {reason}")]
    ResourceCreation { label: String, reason: String },

    /// The light category has no shadow generator.
    #[error("light {id} of type {kind:?} cannot cast shadows")]
    UnsupportedLight { id: LightId, kind: LightType },

    /// Rendering shadow casters failed for one update; the previous map is kept.
    #[error("shadow render for light {id} failed: {reason}")]
    StaleRender { id: LightId, reason: String },

    /// Invalid quality or generator options.
    #[error("invalid shadow configuration: {0}")]
    Configuration(String),
}

impl ShadowError {
    pub(crate) fn resource(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceCreation {
            label: label.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShadowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ShadowError::resource("shadow depth", "framebuffer incomplete");
        assert_eq!(
            err.to_string(),
            "failed to create shadow depth: framebuffer incomplete"
        );

        let err = ShadowError::UnsupportedLight {
            id: LightId(7),
            kind: LightType::Ambient,
        };
        assert!(err.to_string().contains("light #7"));
    }
}
