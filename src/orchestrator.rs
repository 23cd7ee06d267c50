//! Model loading orchestration.
//!
//! Drives a load through the lifecycle tracker and the service registry:
//! announce, build the service on the blocking pool, then confirm or fail.
//! Service constructors may block for seconds (weights are read from disk),
//! so they never run on an async worker thread.

use std::sync::Arc;

use uuid::Uuid;

use crate::capability::{Capability, InferenceFramework, Modality};
use crate::error::CoreError;
use crate::lifecycle::ModelLifecycleTracker;
use crate::registry::{ServiceHandle, ServiceRegistry, ServiceRequest};

/// A model to bring up in one modality.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub model_id: String,
    pub model_name: String,
    pub framework: InferenceFramework,
    pub modality: Modality,
    pub request: ServiceRequest,
    pub memory_usage: Option<u64>,
}

impl LoadRequest {
    /// The service request hint defaults to the model id.
    pub fn new(
        model_id: impl Into<String>,
        framework: InferenceFramework,
        modality: Modality,
    ) -> Self {
        let model_id = model_id.into();
        Self {
            model_name: model_id.clone(),
            request: ServiceRequest::new(model_id.clone()).with_framework(framework),
            model_id,
            framework,
            modality,
            memory_usage: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_request(mut self, request: ServiceRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_memory_usage(mut self, bytes: u64) -> Self {
        self.memory_usage = Some(bytes);
        self
    }
}

/// Result of a successful [`ModelLoader::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModel {
    pub handle: ServiceHandle,
    /// True when an already-loaded instance was handed back.
    pub reused: bool,
    pub correlation_id: Option<String>,
}

/// Loads and unloads models, keeping tracker and registry in step.
#[derive(Clone)]
pub struct ModelLoader {
    services: Arc<ServiceRegistry>,
    lifecycle: Arc<ModelLifecycleTracker>,
}

impl ModelLoader {
    pub fn new(services: Arc<ServiceRegistry>, lifecycle: Arc<ModelLifecycleTracker>) -> Self {
        Self { services, lifecycle }
    }

    /// Load a model, reusing the cached instance when it is already loaded.
    ///
    /// Errors from the registry come back unchanged, so a missing provider
    /// stays distinguishable from a constructor failure.
    pub async fn load(&self, request: LoadRequest) -> Result<LoadedModel, CoreError> {
        let LoadRequest {
            model_id,
            model_name,
            framework,
            modality,
            request,
            memory_usage,
        } = request;

        if let Some(handle) = self.lifecycle.service_handle(&model_id, modality) {
            tracing::debug!(
                model_id = %model_id,
                modality = %modality,
                handle = %handle,
                "Reusing loaded model"
            );
            return Ok(LoadedModel { handle, reused: true, correlation_id: None });
        }

        let capability = service_capability(modality)?;
        let correlation_id = Uuid::new_v4().to_string();
        self.lifecycle.will_load_correlated(
            &model_id,
            &model_name,
            framework,
            modality,
            Some(correlation_id.clone()),
        )?;

        let services = Arc::clone(&self.services);
        let created =
            tokio::task::spawn_blocking(move || services.create_service(capability, &request))
                .await
                .map_err(|e| CoreError::Backend(Box::new(e)))
                .and_then(|result| result);

        let handle = match created {
            Ok(handle) => handle,
            Err(err) => {
                self.lifecycle
                    .load_failed_correlated(&correlation_id, modality, &err.to_string());
                return Err(err);
            }
        };

        if !self
            .lifecycle
            .did_load_correlated(&correlation_id, modality, memory_usage, Some(handle))
        {
            tracing::warn!(
                model_id = %model_id,
                modality = %modality,
                handle = %handle,
                "Load superseded before completion, destroying instance"
            );
            if let Err(err) = self.destroy(capability, handle).await {
                tracing::warn!(
                    handle = %handle,
                    error = %err,
                    "Failed to destroy superseded instance"
                );
            }
            return Err(CoreError::InvalidArgument(format!(
                "load of {model_id} was superseded in {modality}"
            )));
        }

        Ok(LoadedModel {
            handle,
            reused: false,
            correlation_id: Some(correlation_id),
        })
    }

    /// Unload `model_id` from `modality`, destroying its cached instance.
    ///
    /// A model still loading cannot be unloaded yet and yields
    /// [`CoreError::ModalityBusy`]. The slot is cleared even if the
    /// destructor fails; that error is returned afterwards.
    pub async fn unload(&self, model_id: &str, modality: Modality) -> Result<(), CoreError> {
        let handle = self.lifecycle.service_handle(model_id, modality);
        if !self.lifecycle.will_unload(model_id, modality) {
            return Err(match self.lifecycle.loaded_model(modality) {
                Some(entry) if entry.model_id == model_id => CoreError::ModalityBusy {
                    modality,
                    model_id: entry.model_id,
                },
                _ => CoreError::InvalidArgument(format!(
                    "model {model_id} is not tracked in {modality}"
                )),
            });
        }

        let destroyed = match (handle, modality.capability()) {
            (Some(handle), Some(capability)) => self.destroy(capability, handle).await,
            _ => Ok(()),
        };

        self.lifecycle.did_unload(model_id, modality);
        destroyed
    }

    /// Unload every tracked model. Returns the failures.
    pub async fn unload_all(&self) -> Vec<(String, CoreError)> {
        let mut failures = Vec::new();
        for entry in self.lifecycle.tracked_models() {
            if let Err(err) = self.unload(&entry.model_id, entry.modality).await {
                tracing::warn!(
                    model_id = %entry.model_id,
                    error = %err,
                    "Unload failed during shutdown"
                );
                failures.push((entry.model_id, err));
            }
        }
        failures
    }

    /// Forward load progress for an in-flight attempt.
    pub fn report_progress(&self, model_id: &str, modality: Modality, progress: f32) -> bool {
        self.lifecycle.update_progress(model_id, modality, progress)
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn lifecycle(&self) -> &Arc<ModelLifecycleTracker> {
        &self.lifecycle
    }

    async fn destroy(
        &self,
        capability: Capability,
        handle: ServiceHandle,
    ) -> Result<(), CoreError> {
        let services = Arc::clone(&self.services);
        tokio::task::spawn_blocking(move || services.destroy_service(capability, handle))
            .await
            .map_err(|e| CoreError::Backend(Box::new(e)))
            .and_then(|result| result)
    }
}

fn service_capability(modality: Modality) -> Result<Capability, CoreError> {
    modality.capability().ok_or_else(|| {
        CoreError::InvalidArgument(format!("modality {modality} has no service capability"))
    })
}
