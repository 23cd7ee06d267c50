//! Backend modules: one module registers its identity and all of its
//! capability providers as a unit.

use super::modules::{ModuleInfo, ModuleRegistry};
use super::provider::ProviderRegistration;
use super::services::ServiceRegistry;
use crate::error::CoreError;

/// A loadable backend that contributes one or more providers.
pub trait BackendModule: Send + Sync {
    fn info(&self) -> ModuleInfo;

    /// Providers this module offers. The installer tags each with the module id.
    fn providers(&self) -> Vec<ProviderRegistration>;
}

/// Register `module` in both registries, rolling everything back on failure.
pub fn install(
    module: &dyn BackendModule,
    modules: &ModuleRegistry,
    services: &ServiceRegistry,
) -> Result<ModuleInfo, CoreError> {
    let info = module.info();
    modules.register(info.clone())?;

    for registration in module.providers() {
        let capability = registration.capability;
        if !info.capabilities.contains(capability) {
            tracing::warn!(
                module_id = %info.id,
                capability = %capability,
                "Provider capability not advertised by module"
            );
        }

        let registration = registration.from_module(info.id.clone());
        if let Err(e) = services.register_provider(registration) {
            services.unregister_module_providers(&info.id);
            if let Err(undo) = modules.unregister(&info.id) {
                tracing::error!(module_id = %info.id, error = %undo, "Module rollback failed");
            }
            tracing::warn!(module_id = %info.id, error = %e, "Module install rolled back");
            return Err(e);
        }
    }

    Ok(info)
}

/// Remove a module and the providers it contributed.
pub fn uninstall(
    module_id: &str,
    modules: &ModuleRegistry,
    services: &ServiceRegistry,
) -> Result<ModuleInfo, CoreError> {
    let info = modules.unregister(module_id)?;
    let removed = services.unregister_module_providers(module_id);
    tracing::info!(module_id = %module_id, providers = removed, "Module uninstalled");
    Ok(info)
}
