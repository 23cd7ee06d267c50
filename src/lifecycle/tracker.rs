//! Model lifecycle tracker.
//!
//! One slot per modality. Transitions publish `model.*` events on the bus
//! after the slot lock is released. Calls naming a model id other than the
//! one currently tracked are silent no-ops: concurrent load attempts for a
//! modality race, and only the latest one may change state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use super::state::{ModelLifecycleEntry, ModelLoadState};
use crate::capability::{InferenceFramework, Modality};
use crate::clock::{Clock, SystemClock};
use crate::error::CoreError;
use crate::events::{Event, EventBus, EventCategory, EventDestination};
use crate::registry::ServiceHandle;
use crate::telemetry::metrics;

pub const EVENT_WILL_LOAD: &str = "model.will_load";
pub const EVENT_LOAD_PROGRESS: &str = "model.load_progress";
pub const EVENT_DID_LOAD: &str = "model.did_load";
pub const EVENT_LOAD_FAILED: &str = "model.load_failed";
pub const EVENT_WILL_UNLOAD: &str = "model.will_unload";
pub const EVENT_DID_UNLOAD: &str = "model.did_unload";

/// Sinks lifecycle events are addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleDestinations {
    pub transitions: EventDestination,
    pub progress: EventDestination,
}

impl Default for LifecycleDestinations {
    fn default() -> Self {
        Self {
            transitions: EventDestination::ALL,
            progress: EventDestination::PUBLIC,
        }
    }
}

/// Thread-safe per-modality load state machine.
pub struct ModelLifecycleTracker {
    slots: Mutex<HashMap<Modality, ModelLifecycleEntry>>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    destinations: LifecycleDestinations,
}

impl ModelLifecycleTracker {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_clock(bus, Arc::new(SystemClock))
    }

    pub fn with_clock(bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            bus,
            clock,
            destinations: LifecycleDestinations::default(),
        }
    }

    pub fn with_destinations(mut self, destinations: LifecycleDestinations) -> Self {
        self.destinations = destinations;
        self
    }

    /// Start tracking a load.
    ///
    /// Replaces an in-flight or failed attempt. Fails with
    /// [`CoreError::ModalityBusy`] while another model is loaded or
    /// unloading in this modality.
    pub fn will_load(
        &self,
        model_id: &str,
        model_name: &str,
        framework: InferenceFramework,
        modality: Modality,
    ) -> Result<(), CoreError> {
        self.will_load_correlated(model_id, model_name, framework, modality, None)
    }

    /// [`will_load`](Self::will_load) with a correlation id carried by every
    /// event of this attempt.
    pub fn will_load_correlated(
        &self,
        model_id: &str,
        model_name: &str,
        framework: InferenceFramework,
        modality: Modality,
        correlation_id: Option<String>,
    ) -> Result<(), CoreError> {
        if model_id.is_empty() {
            return Err(CoreError::InvalidArgument("model id must not be empty".into()));
        }

        let entry = {
            let mut slots = self.slots.lock();
            if let Some(current) = slots.get(&modality) {
                if matches!(current.state, ModelLoadState::Loaded | ModelLoadState::Unloading) {
                    tracing::warn!(
                        modality = %modality,
                        current = %current.model_id,
                        requested = %model_id,
                        "Load rejected: modality busy"
                    );
                    return Err(CoreError::ModalityBusy {
                        modality,
                        model_id: current.model_id.clone(),
                    });
                }
                if current.state.is_loading() {
                    tracing::debug!(
                        modality = %modality,
                        superseded = %current.model_id,
                        "Superseding in-flight load"
                    );
                }
            }
            let entry = ModelLifecycleEntry::loading(
                model_id,
                model_name,
                framework,
                modality,
                correlation_id,
            );
            slots.insert(modality, entry.clone());
            entry
        };

        tracing::info!(
            model_id = %model_id,
            modality = %modality,
            framework = %framework,
            "Model load started"
        );
        self.emit(EVENT_WILL_LOAD, &entry, json!({}), self.destinations.transitions);
        Ok(())
    }

    /// Record progress for the tracked attempt. Returns false if `model_id`
    /// is not the attempt currently loading in `modality`.
    pub fn update_progress(&self, model_id: &str, modality: Modality, progress: f32) -> bool {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        let entry = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&modality) {
                Some(entry) if entry.model_id == model_id && entry.state.is_loading() => {
                    entry.state = ModelLoadState::Loading { progress };
                    entry.clone()
                }
                _ => return false,
            }
        };

        self.emit(
            EVENT_LOAD_PROGRESS,
            &entry,
            json!({ "progress": progress }),
            self.destinations.progress,
        );
        true
    }

    /// Mark a model loaded, optionally caching its service handle for reuse.
    ///
    /// Applies when the modality is untracked or `model_id` is the attempt
    /// currently loading. A completion for a superseded attempt returns false
    /// and the caller keeps ownership of `service_handle`.
    pub fn did_load(
        &self,
        model_id: &str,
        model_name: &str,
        framework: InferenceFramework,
        modality: Modality,
        memory_usage: Option<u64>,
        service_handle: Option<ServiceHandle>,
    ) -> bool {
        let now = self.clock.now_ms();
        let entry = {
            let mut slots = self.slots.lock();
            if let Some(current) = slots.get(&modality) {
                if current.model_id != model_id || !current.state.is_loading() {
                    return false;
                }
            }
            let entry = slots.entry(modality).or_insert_with(|| {
                ModelLifecycleEntry::loading(model_id, model_name, framework, modality, None)
            });
            entry.model_name = model_name.to_string();
            entry.framework = framework;
            mark_loaded(entry, now, memory_usage, service_handle);
            entry.clone()
        };

        self.announce_loaded(&entry);
        true
    }

    /// Complete the attempt started with `correlation_id`.
    ///
    /// Unlike [`did_load`](Self::did_load) this never creates a slot: it
    /// applies only while that exact attempt is still loading, so a retry of
    /// the same model id or an unload in between makes it return false.
    pub fn did_load_correlated(
        &self,
        correlation_id: &str,
        modality: Modality,
        memory_usage: Option<u64>,
        service_handle: Option<ServiceHandle>,
    ) -> bool {
        let now = self.clock.now_ms();
        let entry = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&modality) {
                Some(entry) if is_attempt(entry, correlation_id) => {
                    mark_loaded(entry, now, memory_usage, service_handle);
                    entry.clone()
                }
                _ => return false,
            }
        };

        self.announce_loaded(&entry);
        true
    }

    /// Move the tracked attempt to `Error`. The cached handle, if any, is
    /// forgotten; destroying it stays with the caller.
    pub fn load_failed(&self, model_id: &str, modality: Modality, error: &str) -> bool {
        let entry = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&modality) {
                Some(entry)
                    if entry.model_id == model_id
                        && matches!(
                            entry.state,
                            ModelLoadState::Loading { .. } | ModelLoadState::Loaded
                        ) =>
                {
                    mark_failed(entry, error);
                    entry.clone()
                }
                _ => return false,
            }
        };

        self.announce_failed(&entry, error);
        true
    }

    /// Fail the attempt started with `correlation_id`, if it is still loading.
    pub fn load_failed_correlated(
        &self,
        correlation_id: &str,
        modality: Modality,
        error: &str,
    ) -> bool {
        let entry = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&modality) {
                Some(entry) if is_attempt(entry, correlation_id) => {
                    mark_failed(entry, error);
                    entry.clone()
                }
                _ => return false,
            }
        };

        self.announce_failed(&entry, error);
        true
    }

    /// Begin unloading the tracked model.
    ///
    /// Only a `Loaded` or failed slot can be unloaded; an attempt still
    /// loading has to complete or fail first.
    pub fn will_unload(&self, model_id: &str, modality: Modality) -> bool {
        let entry = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&modality) {
                Some(entry) if entry.model_id == model_id && is_unloadable(&entry.state) => {
                    entry.state = ModelLoadState::Unloading;
                    entry.clone()
                }
                _ => return false,
            }
        };

        self.emit(EVENT_WILL_UNLOAD, &entry, json!({}), self.destinations.transitions);
        true
    }

    /// Drop the modality's slot. A slot still loading is left alone.
    pub fn did_unload(&self, model_id: &str, modality: Modality) -> bool {
        let entry = {
            let mut slots = self.slots.lock();
            let tracked = slots
                .get(&modality)
                .is_some_and(|e| e.model_id == model_id && !e.state.is_loading());
            if tracked {
                slots.remove(&modality)
            } else {
                None
            }
        };
        let Some(entry) = entry else {
            return false;
        };

        tracing::info!(model_id = %model_id, modality = %modality, "Model unloaded");
        self.emit(EVENT_DID_UNLOAD, &entry, json!({}), self.destinations.transitions);
        true
    }

    /// Current slot for `modality`, whatever its state.
    pub fn loaded_model(&self, modality: Modality) -> Option<ModelLifecycleEntry> {
        self.slots.lock().get(&modality).cloned()
    }

    pub fn state(&self, modality: Modality) -> ModelLoadState {
        self.slots
            .lock()
            .get(&modality)
            .map(|e| e.state.clone())
            .unwrap_or(ModelLoadState::NotLoaded)
    }

    pub fn is_loaded(&self, modality: Modality) -> bool {
        self.slots.lock().get(&modality).is_some_and(|e| e.state.is_loaded())
    }

    /// Whether `model_id` is loaded in any modality.
    pub fn is_model_loaded(&self, model_id: &str) -> bool {
        self.slots
            .lock()
            .values()
            .any(|e| e.model_id == model_id && e.state.is_loaded())
    }

    /// Entries in state `Loaded`, ordered by modality.
    pub fn all_loaded_models(&self) -> Vec<ModelLifecycleEntry> {
        let mut loaded: Vec<_> = self
            .slots
            .lock()
            .values()
            .filter(|e| e.state.is_loaded())
            .cloned()
            .collect();
        loaded.sort_by_key(|e| e.modality);
        loaded
    }

    /// Every tracked slot, ordered by modality.
    pub fn tracked_models(&self) -> Vec<ModelLifecycleEntry> {
        let mut all: Vec<_> = self.slots.lock().values().cloned().collect();
        all.sort_by_key(|e| e.modality);
        all
    }

    /// Cached handle for reuse, only while `model_id` is loaded in `modality`.
    pub fn service_handle(&self, model_id: &str, modality: Modality) -> Option<ServiceHandle> {
        self.slots
            .lock()
            .get(&modality)
            .filter(|e| e.model_id == model_id && e.state.is_loaded())
            .and_then(|e| e.service_handle)
    }

    /// Forget every slot without emitting events.
    pub fn reset(&self) {
        self.slots.lock().clear();
    }

    fn announce_loaded(&self, entry: &ModelLifecycleEntry) {
        tracing::info!(
            model_id = %entry.model_id,
            modality = %entry.modality,
            memory_usage = ?entry.memory_usage,
            "Model loaded"
        );
        self.emit(
            EVENT_DID_LOAD,
            entry,
            json!({ "memory_usage": entry.memory_usage, "loaded_at_ms": entry.loaded_at_ms }),
            self.destinations.transitions,
        );
    }

    fn announce_failed(&self, entry: &ModelLifecycleEntry, error: &str) {
        tracing::warn!(
            model_id = %entry.model_id,
            modality = %entry.modality,
            error = %error,
            "Model load failed"
        );
        self.emit(
            EVENT_LOAD_FAILED,
            entry,
            json!({ "error": error }),
            self.destinations.transitions,
        );
    }

    fn emit(
        &self,
        event_type: &'static str,
        entry: &ModelLifecycleEntry,
        extra: serde_json::Value,
        destination: EventDestination,
    ) {
        metrics::record_model_transition(entry.modality, event_type);

        let mut payload = json!({
            "model_id": entry.model_id,
            "model_name": entry.model_name,
            "framework": entry.framework,
            "modality": entry.modality.as_str(),
        });
        if let (Some(base), serde_json::Value::Object(more)) = (payload.as_object_mut(), extra) {
            base.extend(more);
        }

        let mut event = Event::new(EventCategory::Model, event_type)
            .with_payload(payload)
            .with_destination(destination);
        event.correlation_id = entry.correlation_id.clone();
        self.bus.publish(event);
    }
}

fn is_attempt(entry: &ModelLifecycleEntry, correlation_id: &str) -> bool {
    entry.state.is_loading() && entry.correlation_id.as_deref() == Some(correlation_id)
}

fn is_unloadable(state: &ModelLoadState) -> bool {
    matches!(state, ModelLoadState::Loaded | ModelLoadState::Error { .. })
}

fn mark_loaded(
    entry: &mut ModelLifecycleEntry,
    now: u64,
    memory_usage: Option<u64>,
    service_handle: Option<ServiceHandle>,
) {
    entry.state = ModelLoadState::Loaded;
    entry.loaded_at_ms = Some(now);
    entry.memory_usage = memory_usage;
    entry.service_handle = service_handle;
}

fn mark_failed(entry: &mut ModelLifecycleEntry, error: &str) {
    entry.state = ModelLoadState::Error { reason: error.to_string() };
    entry.service_handle = None;
    entry.loaded_at_ms = None;
}
