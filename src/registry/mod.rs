//! Module and service registries.
//!
//! The two stores are independent. A backend module normally appears in
//! both; [`backend::install`] keeps them in step.

pub mod backend;

mod modules;
mod provider;
mod services;

pub use backend::BackendModule;
pub use modules::{ModuleInfo, ModuleRegistry, DEFAULT_PRIORITY};
pub use provider::{
    FnProvider, ProviderRegistration, ServiceObject, ServiceProvider, ServiceRequest,
};
pub use services::{ProviderId, ProviderInfo, ServiceHandle, ServiceOwner, ServiceRegistry};
