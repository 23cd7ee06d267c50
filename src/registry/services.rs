//! Capability resolution and ownership tracking of live service instances.
//!
//! Providers are kept per capability, sorted by descending priority with
//! ties in registration order. Every instance created through the registry
//! is recorded in a side table (`handle -> owner`) so destruction always
//! reaches the provider that built it.
//!
//! Bookkeeping happens under one short lock. Provider callbacks
//! (`can_handle`, `create`, `destroy`) run outside of it, so a slow backend
//! initialization never blocks unrelated resolutions.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::provider::{ProviderRegistration, ServiceObject, ServiceProvider, ServiceRequest};
use crate::capability::Capability;
use crate::error::CoreError;
use crate::telemetry::{metrics, ServiceSpan, SpanExt};

/// Opaque token identifying a live service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServiceHandle(u64);

impl ServiceHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svc#{}", self.0)
    }
}

/// Identity assigned to each provider registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProviderId(u64);

impl ProviderId {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Public view of a registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub capability: Capability,
    pub name: String,
    pub priority: i32,
    pub module_id: Option<String>,
}

/// Owner recorded for a live handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceOwner {
    pub capability: Capability,
    pub provider_id: ProviderId,
    pub provider_name: String,
}

struct ProviderEntry {
    id: ProviderId,
    registration: ProviderRegistration,
}

impl ProviderEntry {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: self.id,
            capability: self.registration.capability,
            name: self.registration.name.clone(),
            priority: self.registration.priority,
            module_id: self.registration.module_id.clone(),
        }
    }
}

struct ServiceRecord {
    owner: ServiceOwner,
    // Held so destruction still routes here after the provider is unregistered.
    provider: Arc<dyn ServiceProvider>,
    service: ServiceObject,
}

#[derive(Default)]
struct ServiceTable {
    providers: HashMap<Capability, Vec<Arc<ProviderEntry>>>,
    services: HashMap<ServiceHandle, ServiceRecord>,
}

/// Thread-safe provider registry with a handle -> owner side table.
pub struct ServiceRegistry {
    inner: Mutex<ServiceTable>,
    next_provider: AtomicU64,
    next_handle: AtomicU64,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ServiceTable::default()),
            next_provider: AtomicU64::new(1),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Add a provider for its capability.
    ///
    /// Provider names are unique within a capability.
    pub fn register_provider(
        &self,
        registration: ProviderRegistration,
    ) -> Result<ProviderId, CoreError> {
        if registration.name.is_empty() {
            return Err(CoreError::InvalidArgument("provider name must not be empty".into()));
        }

        let capability = registration.capability;
        let mut table = self.inner.lock();
        let providers = table.providers.entry(capability).or_default();
        if providers.iter().any(|p| p.registration.name == registration.name) {
            return Err(CoreError::AlreadyRegistered(registration.name));
        }

        let id = ProviderId(self.next_provider.fetch_add(1, Ordering::SeqCst));
        tracing::info!(
            provider = %registration.name,
            capability = %capability,
            priority = registration.priority,
            "Registered provider"
        );
        providers.push(Arc::new(ProviderEntry { id, registration }));
        // Stable sort: the new entry lands after existing ones of equal priority.
        providers.sort_by(|a, b| b.registration.priority.cmp(&a.registration.priority));
        Ok(id)
    }

    /// Remove a provider by name. Live instances it created stay destroyable.
    pub fn unregister_provider(&self, capability: Capability, name: &str) -> Result<(), CoreError> {
        let mut table = self.inner.lock();
        let providers = table
            .providers
            .get_mut(&capability)
            .ok_or_else(|| CoreError::provider_not_found(name))?;

        let before = providers.len();
        providers.retain(|p| p.registration.name != name);
        if providers.len() == before {
            return Err(CoreError::provider_not_found(name));
        }
        if providers.is_empty() {
            table.providers.remove(&capability);
        }
        tracing::info!(provider = %name, capability = %capability, "Unregistered provider");
        Ok(())
    }

    /// Remove every provider contributed by `module_id`. Returns how many were removed.
    pub fn unregister_module_providers(&self, module_id: &str) -> usize {
        let mut table = self.inner.lock();
        let mut removed = 0;
        for providers in table.providers.values_mut() {
            let before = providers.len();
            providers.retain(|p| p.registration.module_id.as_deref() != Some(module_id));
            removed += before - providers.len();
        }
        table.providers.retain(|_, list| !list.is_empty());
        removed
    }

    /// Resolve `capability` to the first provider whose `can_handle` accepts
    /// the request and build a service with it.
    ///
    /// Constructor failures come back as [`CoreError::Backend`] and leave no
    /// record behind.
    pub fn create_service(
        &self,
        capability: Capability,
        request: &ServiceRequest,
    ) -> Result<ServiceHandle, CoreError> {
        let span = ServiceSpan::new("create_service", capability, &request.hint);
        let _enter = span.enter();

        let result = self.create_service_inner(capability, request);
        span.record_result(&result);
        result
    }

    fn create_service_inner(
        &self,
        capability: Capability,
        request: &ServiceRequest,
    ) -> Result<ServiceHandle, CoreError> {
        let candidates = self
            .inner
            .lock()
            .providers
            .get(&capability)
            .cloned()
            .unwrap_or_default();

        let Some(entry) = candidates
            .iter()
            .find(|p| p.registration.provider.can_handle(request))
        else {
            metrics::record_resolution_failure(capability);
            tracing::warn!(
                capability = %capability,
                hint = %request.hint,
                "No provider could handle the request"
            );
            return Err(CoreError::BackendNotFound(capability));
        };

        let provider = Arc::clone(&entry.registration.provider);
        let service = provider.create(request).map_err(CoreError::Backend)?;

        let handle = ServiceHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let owner = ServiceOwner {
            capability,
            provider_id: entry.id,
            provider_name: entry.registration.name.clone(),
        };
        let live = {
            let mut table = self.inner.lock();
            table.services.insert(handle, ServiceRecord { owner, provider, service });
            table.services.len()
        };

        metrics::record_service_created(capability, live);
        tracing::debug!(
            handle = %handle,
            provider = %entry.registration.name,
            "Service created by provider"
        );
        Ok(handle)
    }

    /// Destroy a live service through the provider that created it.
    ///
    /// The capability must match the one recorded at creation; on mismatch
    /// nothing is destroyed. The handle is invalid after this returns, even
    /// if the provider's destructor reports an error.
    pub fn destroy_service(
        &self,
        capability: Capability,
        handle: ServiceHandle,
    ) -> Result<(), CoreError> {
        let span = ServiceSpan::new("destroy_service", capability, "");
        let _enter = span.enter();

        let result = self.destroy_service_inner(capability, handle);
        span.record_result(&result);
        result
    }

    fn destroy_service_inner(
        &self,
        capability: Capability,
        handle: ServiceHandle,
    ) -> Result<(), CoreError> {
        let (record, live) = {
            let mut table = self.inner.lock();
            match table.services.get(&handle) {
                None => return Err(CoreError::InvalidHandle(handle)),
                Some(r) if r.owner.capability != capability => {
                    tracing::warn!(
                        handle = %handle,
                        expected = %r.owner.capability,
                        got = %capability,
                        "Capability mismatch on destroy"
                    );
                    return Err(CoreError::InvalidArgument(format!(
                        "{} was created for {}, not {}",
                        handle, r.owner.capability, capability
                    )));
                }
                Some(_) => {}
            }
            let record = table.services.remove(&handle);
            (record, table.services.len())
        };
        let record = record.ok_or(CoreError::InvalidHandle(handle))?;

        metrics::record_service_destroyed(capability, live);
        tracing::debug!(
            handle = %handle,
            provider = %record.owner.provider_name,
            "Destroying service"
        );
        record.provider.destroy(record.service).map_err(CoreError::Backend)
    }

    /// Typed access to a live service instance.
    pub fn service<T: Any + Send + Sync>(
        &self,
        handle: ServiceHandle,
    ) -> Result<Arc<T>, CoreError> {
        let object = self.service_object(handle).ok_or(CoreError::InvalidHandle(handle))?;
        object.downcast::<T>().map_err(|_| {
            CoreError::InvalidArgument(format!(
                "{} is not a {}",
                handle,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn service_object(&self, handle: ServiceHandle) -> Option<ServiceObject> {
        self.inner.lock().services.get(&handle).map(|r| Arc::clone(&r.service))
    }

    pub fn owner(&self, handle: ServiceHandle) -> Option<ServiceOwner> {
        self.inner.lock().services.get(&handle).map(|r| r.owner.clone())
    }

    /// Providers for `capability` in selection order.
    pub fn list_providers(&self, capability: Capability) -> Vec<ProviderInfo> {
        self.inner
            .lock()
            .providers
            .get(&capability)
            .map(|list| list.iter().map(|p| p.info()).collect())
            .unwrap_or_default()
    }

    pub fn has_provider(&self, capability: Capability) -> bool {
        self.inner
            .lock()
            .providers
            .get(&capability)
            .is_some_and(|list| !list.is_empty())
    }

    /// Live handles with their owners, ordered by handle.
    pub fn live_services(&self) -> Vec<(ServiceHandle, ServiceOwner)> {
        let mut live: Vec<_> = self
            .inner
            .lock()
            .services
            .iter()
            .map(|(h, r)| (*h, r.owner.clone()))
            .collect();
        live.sort_by_key(|(h, _)| *h);
        live
    }

    pub fn live_service_count(&self) -> usize {
        self.inner.lock().services.len()
    }

    /// Destroy every live service through its owner, lowest handle first.
    ///
    /// Records leave the table one at a time, right before their own
    /// destructor runs. A destructor that panics is reported like one that
    /// failed and the remaining records are still torn down.
    pub fn destroy_all(&self) -> Vec<(ServiceHandle, CoreError)> {
        let mut failures = Vec::new();
        while let Some((handle, record, live)) = self.take_next_record() {
            metrics::record_service_destroyed(record.owner.capability, live);
            let ServiceRecord { provider, service, .. } = record;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| provider.destroy(service)));
            let err = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(payload) => {
                    format!("destructor panicked: {}", panic_message(payload.as_ref())).into()
                }
            };
            tracing::error!(
                handle = %handle,
                error = %err,
                "Service destructor failed during teardown"
            );
            failures.push((handle, CoreError::Backend(err)));
        }
        failures
    }

    fn take_next_record(&self) -> Option<(ServiceHandle, ServiceRecord, usize)> {
        let mut table = self.inner.lock();
        let handle = table.services.keys().min().copied()?;
        let record = table.services.remove(&handle)?;
        Some((handle, record, table.services.len()))
    }

    /// Forget all providers and live records without calling destructors.
    pub fn reset(&self) {
        let mut table = self.inner.lock();
        table.providers.clear();
        table.services.clear();
        metrics::set_live_services(0);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::provider::FnProvider;

    fn unit_provider() -> FnProvider {
        FnProvider::new(|_| Ok(Arc::new(()) as ServiceObject))
    }

    #[test]
    fn test_no_provider_is_backend_not_found() {
        let registry = ServiceRegistry::new();
        let err = registry
            .create_service(Capability::Embeddings, &ServiceRequest::new("x"))
            .unwrap_err();
        assert!(matches!(err, CoreError::BackendNotFound(Capability::Embeddings)));
        assert_eq!(registry.live_service_count(), 0);
    }

    #[test]
    fn test_duplicate_provider_name_rejected() {
        let registry = ServiceRegistry::new();
        let reg = ProviderRegistration::new(Capability::TextToSpeech, "piper", unit_provider());
        registry.register_provider(reg.clone()).unwrap();
        assert!(matches!(
            registry.register_provider(reg),
            Err(CoreError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_same_name_allowed_across_capabilities() {
        let registry = ServiceRegistry::new();
        registry
            .register_provider(ProviderRegistration::new(
                Capability::TextToSpeech,
                "onnx",
                unit_provider(),
            ))
            .unwrap();
        registry
            .register_provider(ProviderRegistration::new(
                Capability::SpeechToText,
                "onnx",
                unit_provider(),
            ))
            .unwrap();
        assert!(registry.has_provider(Capability::TextToSpeech));
        assert!(registry.has_provider(Capability::SpeechToText));
    }

    #[test]
    fn test_typed_service_lookup() {
        let registry = ServiceRegistry::new();
        registry
            .register_provider(ProviderRegistration::new(
                Capability::TextGeneration,
                "echo",
                FnProvider::new(|req| Ok(Arc::new(req.hint.clone()) as ServiceObject)),
            ))
            .unwrap();

        let handle = registry
            .create_service(Capability::TextGeneration, &ServiceRequest::new("qwen"))
            .unwrap();
        let svc = registry.service::<String>(handle).unwrap();
        assert_eq!(svc.as_str(), "qwen");
        assert!(matches!(registry.service::<u32>(handle), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_unregister_module_providers() {
        let registry = ServiceRegistry::new();
        for cap in [Capability::SpeechToText, Capability::TextToSpeech] {
            registry
                .register_provider(
                    ProviderRegistration::new(cap, "onnx", unit_provider()).from_module("onnx"),
                )
                .unwrap();
        }
        registry
            .register_provider(ProviderRegistration::new(
                Capability::SpeechToText,
                "whisper",
                unit_provider(),
            ))
            .unwrap();

        assert_eq!(registry.unregister_module_providers("onnx"), 2);
        assert!(!registry.has_provider(Capability::TextToSpeech));
        assert_eq!(registry.list_providers(Capability::SpeechToText).len(), 1);
    }

    #[test]
    fn test_reset_skips_destructors() {
        let registry = ServiceRegistry::new();
        let destroyed = Arc::new(AtomicU64::new(0));
        let counter = destroyed.clone();
        registry
            .register_provider(ProviderRegistration::new(
                Capability::VoiceActivityDetection,
                "energy",
                unit_provider().on_destroy(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            ))
            .unwrap();
        registry
            .create_service(Capability::VoiceActivityDetection, &ServiceRequest::new("vad"))
            .unwrap();

        registry.reset();
        assert_eq!(registry.live_service_count(), 0);
        assert!(!registry.has_provider(Capability::VoiceActivityDetection));
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    }
}
