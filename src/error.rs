//! Error types for the capability core.
//!
//! Registry misuse (duplicate ids, stale handles, capability mismatches) is
//! reported as a typed variant. Backend failures pass through verbatim in
//! [`CoreError::Backend`] so callers can tell the two apart.

use thiserror::Error;

use crate::capability::{Capability, Modality};
use crate::registry::ServiceHandle;

/// Error raised by a backend provider's own constructor or destructor.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What kind of entry a [`CoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Module,
    Provider,
    Service,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Module => f.write_str("module"),
            Self::Provider => f.write_str("provider"),
            Self::Service => f.write_str("service"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: LookupKind, id: String },

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No provider available for capability {0}")]
    BackendNotFound(Capability),

    #[error("Backend failure: {0}")]
    Backend(#[source] BackendError),

    #[error("Invalid service handle: {0}")]
    InvalidHandle(ServiceHandle),

    #[error("Modality {modality} is busy with model {model_id}; unload it first")]
    ModalityBusy { modality: Modality, model_id: String },
}

impl CoreError {
    pub(crate) fn module_not_found(id: &str) -> Self {
        Self::NotFound { kind: LookupKind::Module, id: id.to_string() }
    }

    pub(crate) fn provider_not_found(name: &str) -> Self {
        Self::NotFound { kind: LookupKind::Provider, id: name.to_string() }
    }

    /// Returns true if the error came from a backend rather than the registry.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Returns true if the caller used the registry incorrectly.
    pub fn is_registry_misuse(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRegistered(_)
                | Self::InvalidArgument(_)
                | Self::InvalidHandle(_)
                | Self::NotFound { .. }
        )
    }

    /// Returns true if this error should be logged as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::AlreadyRegistered(_) | Self::ModalityBusy { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_backend_not_found_names_capability() {
        let err = CoreError::BackendNotFound(Capability::SpeechToText);
        assert_eq!(err.to_string(), "No provider available for capability SpeechToText");
        assert!(!err.is_backend_failure());
        assert!(!err.is_registry_misuse());
    }

    #[test]
    fn test_backend_error_keeps_source() {
        let inner: BackendError = "weights missing".into();
        let err = CoreError::Backend(inner);
        assert!(err.is_backend_failure());
        assert_eq!(err.source().map(|s| s.to_string()), Some("weights missing".to_string()));
    }

    #[test]
    fn test_misuse_classification() {
        assert!(CoreError::AlreadyRegistered("m".into()).is_registry_misuse());
        assert!(CoreError::InvalidHandle(ServiceHandle::new(3)).is_registry_misuse());
        assert!(CoreError::module_not_found("x").is_registry_misuse());
        assert!(CoreError::module_not_found("x").to_string().contains("module not found: x"));
    }
}
