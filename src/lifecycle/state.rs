//! Per-modality model load state.

use serde::Serialize;

use crate::capability::{InferenceFramework, Modality};
use crate::registry::ServiceHandle;

/// Load state of one modality slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelLoadState {
    NotLoaded,
    Loading { progress: f32 },
    Loaded,
    Unloading,
    Error { reason: String },
}

impl ModelLoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotLoaded => "not_loaded",
            Self::Loading { .. } => "loading",
            Self::Loaded => "loaded",
            Self::Unloading => "unloading",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    /// Progress in `[0, 1]` while loading, 1 once loaded.
    pub fn progress(&self) -> Option<f32> {
        match self {
            Self::Loading { progress } => Some(*progress),
            Self::Loaded => Some(1.0),
            _ => None,
        }
    }
}

/// Tracked load attempt for one modality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelLifecycleEntry {
    pub model_id: String,
    pub model_name: String,
    pub framework: InferenceFramework,
    pub modality: Modality,
    pub state: ModelLoadState,
    /// Epoch ms of the transition to `Loaded`.
    pub loaded_at_ms: Option<u64>,
    pub memory_usage: Option<u64>,
    pub service_handle: Option<ServiceHandle>,
    pub correlation_id: Option<String>,
}

impl ModelLifecycleEntry {
    pub(crate) fn loading(
        model_id: &str,
        model_name: &str,
        framework: InferenceFramework,
        modality: Modality,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            model_id: model_id.to_string(),
            model_name: model_name.to_string(),
            framework,
            modality,
            state: ModelLoadState::Loading { progress: 0.0 },
            loaded_at_ms: None,
            memory_usage: None,
            service_handle: None,
            correlation_id,
        }
    }
}
