//! capcore: capability routing core for multi-backend AI runtimes.
//!
//! Backends (llama.cpp, ONNX, whisper.cpp, platform speech engines) plug in
//! as modules that contribute providers for capabilities such as text
//! generation or speech-to-text. The core picks a provider per request,
//! tracks which model is loaded in each modality, and broadcasts lifecycle
//! events to host subscribers.
//!
//! # Components
//!
//! - [`registry::ModuleRegistry`]: which backend modules are present
//! - [`registry::ServiceRegistry`]: capability providers and live service instances
//! - [`lifecycle::ModelLifecycleTracker`]: per-modality load state machine
//! - [`events::EventBus`]: categorized publish/subscribe
//!
//! All components are thread-safe and shared through [`Runtime`].

pub mod capability;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;
pub mod telemetry;

use std::sync::Arc;

use clock::{Clock, SystemClock};
use config::CoreConfig;
use events::EventBus;
use health::{HealthChecker, HealthReport};
use lifecycle::ModelLifecycleTracker;
use orchestrator::ModelLoader;
use registry::{BackendModule, ModuleInfo, ModuleRegistry, ServiceHandle, ServiceRegistry};

pub use capability::{Capability, CapabilitySet, InferenceFramework, Modality};
pub use error::{BackendError, CoreError};

/// The runtime core instance.
pub struct Runtime {
    pub events: Arc<EventBus>,
    pub modules: Arc<ModuleRegistry>,
    pub services: Arc<ServiceRegistry>,
    pub lifecycle: Arc<ModelLifecycleTracker>,
    pub loader: ModelLoader,
}

impl Runtime {
    /// Create a new runtime instance with the given configuration.
    pub fn new(config: CoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CoreConfig, clock: Arc<dyn Clock>) -> Self {
        let events = Arc::new(EventBus::with_clock(Arc::clone(&clock)));
        let modules = Arc::new(ModuleRegistry::new());
        let services = Arc::new(ServiceRegistry::new());
        let lifecycle = Arc::new(
            ModelLifecycleTracker::with_clock(Arc::clone(&events), clock)
                .with_destinations(config.lifecycle_destinations()),
        );
        let loader = ModelLoader::new(Arc::clone(&services), Arc::clone(&lifecycle));

        tracing::debug!(config = ?config.effective_config(), "Runtime created");
        Self {
            events,
            modules,
            services,
            lifecycle,
            loader,
        }
    }

    /// Register a backend module and all of its providers.
    pub fn install_module(&self, module: &dyn BackendModule) -> Result<ModuleInfo, CoreError> {
        let info = registry::backend::install(module, &self.modules, &self.services)?;
        tracing::info!(
            module_id = %info.id,
            capabilities = info.capabilities.bits(),
            "Module installed"
        );
        Ok(info)
    }

    /// Remove a module and the providers it contributed. Live instances keep
    /// routing destruction to the provider that built them.
    pub fn uninstall_module(&self, module_id: &str) -> Result<ModuleInfo, CoreError> {
        registry::backend::uninstall(module_id, &self.modules, &self.services)
    }

    pub fn health(&self, checker: &HealthChecker) -> HealthReport {
        checker.report(&self.modules, &self.services, &self.lifecycle)
    }

    /// Unload every model, then destroy any remaining live instance.
    pub async fn shutdown(&self) -> Vec<(String, CoreError)> {
        let mut failures = self.loader.unload_all().await;
        let services = Arc::clone(&self.services);
        match tokio::task::spawn_blocking(move || services.destroy_all()).await {
            Ok(leftovers) => failures.extend(
                leftovers
                    .into_iter()
                    .map(|(handle, err): (ServiceHandle, CoreError)| (handle.to_string(), err)),
            ),
            Err(e) => {
                tracing::error!(error = %e, "Service teardown task failed");
                failures.push(("services".to_string(), CoreError::Backend(Box::new(e))));
            }
        }
        tracing::info!(failures = failures.len(), "Runtime shut down");
        failures
    }

    /// Forget all registrations, tracked models and subscribers without
    /// invoking any destructor.
    pub fn reset(&self) {
        self.lifecycle.reset();
        self.services.reset();
        self.modules.reset();
        self.events.clear();
    }

    /// Whether a model is loaded in `modality`.
    pub fn is_loaded(&self, modality: Modality) -> bool {
        self.lifecycle.is_loaded(modality)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}
