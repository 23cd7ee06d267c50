//! Provider contract used by [`ServiceRegistry`](super::ServiceRegistry).

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use crate::capability::{Capability, InferenceFramework};
use crate::error::BackendError;
use crate::registry::modules::DEFAULT_PRIORITY;

/// A live backend service instance, opaque to the core.
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// Parameters of a capability request.
#[derive(Debug, Clone, Default)]
pub struct ServiceRequest {
    /// Selection hint, usually a model id or path.
    pub hint: String,
    pub framework: Option<InferenceFramework>,
    pub model_path: Option<PathBuf>,
    /// Backend-specific configuration. Cancellation tokens and timeouts
    /// travel through here too.
    pub config: serde_json::Value,
}

impl ServiceRequest {
    pub fn new(hint: impl Into<String>) -> Self {
        Self { hint: hint.into(), ..Default::default() }
    }

    pub fn with_framework(mut self, framework: InferenceFramework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// A backend implementation of one capability.
///
/// Any context the backend needs lives in the implementing type.
pub trait ServiceProvider: Send + Sync {
    /// Whether this provider wants to serve the request.
    fn can_handle(&self, request: &ServiceRequest) -> bool;

    /// Build a service instance. May block for a long time.
    fn create(&self, request: &ServiceRequest) -> Result<ServiceObject, BackendError>;

    /// Tear down an instance previously returned by [`create`](Self::create).
    fn destroy(&self, service: ServiceObject) -> Result<(), BackendError>;
}

type CanHandleFn = dyn Fn(&ServiceRequest) -> bool + Send + Sync;
type CreateFn = dyn Fn(&ServiceRequest) -> Result<ServiceObject, BackendError> + Send + Sync;
type DestroyFn = dyn Fn(ServiceObject) -> Result<(), BackendError> + Send + Sync;

/// Provider assembled from closures.
pub struct FnProvider {
    can_handle: Box<CanHandleFn>,
    create: Box<CreateFn>,
    destroy: Box<DestroyFn>,
}

impl FnProvider {
    /// Provider that accepts every request and drops instances on destroy.
    pub fn new<C>(create: C) -> Self
    where
        C: Fn(&ServiceRequest) -> Result<ServiceObject, BackendError> + Send + Sync + 'static,
    {
        Self {
            can_handle: Box::new(|_| true),
            create: Box::new(create),
            destroy: Box::new(|_| Ok(())),
        }
    }

    pub fn with_predicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&ServiceRequest) -> bool + Send + Sync + 'static,
    {
        self.can_handle = Box::new(f);
        self
    }

    pub fn on_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(ServiceObject) -> Result<(), BackendError> + Send + Sync + 'static,
    {
        self.destroy = Box::new(f);
        self
    }
}

impl ServiceProvider for FnProvider {
    fn can_handle(&self, request: &ServiceRequest) -> bool {
        (self.can_handle)(request)
    }

    fn create(&self, request: &ServiceRequest) -> Result<ServiceObject, BackendError> {
        (self.create)(request)
    }

    fn destroy(&self, service: ServiceObject) -> Result<(), BackendError> {
        (self.destroy)(service)
    }
}

/// Everything needed to register a provider.
#[derive(Clone)]
pub struct ProviderRegistration {
    pub capability: Capability,
    pub name: String,
    pub priority: i32,
    /// Module that contributed this provider, if any.
    pub module_id: Option<String>,
    pub provider: Arc<dyn ServiceProvider>,
}

impl ProviderRegistration {
    pub fn new(
        capability: Capability,
        name: impl Into<String>,
        provider: impl ServiceProvider + 'static,
    ) -> Self {
        Self {
            capability,
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            module_id: None,
            provider: Arc::new(provider),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn from_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }
}

impl std::fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("capability", &self.capability)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("module_id", &self.module_id)
            .finish_non_exhaustive()
    }
}
