//! Health reporting for the runtime core.
//!
//! Summarizes registry and lifecycle state for host diagnostics.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilitySet};
use crate::lifecycle::{ModelLifecycleTracker, ModelLoadState};
use crate::registry::{ModuleRegistry, ServiceRegistry};

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub modules: usize,
    /// Provider count per capability, keyed by capability name.
    pub providers_per_capability: BTreeMap<&'static str, usize>,
    /// Required capabilities with no provider.
    pub missing_capabilities: Vec<&'static str>,
    pub live_services: usize,
    pub loaded_models: usize,
    /// Modalities whose last load failed.
    pub failed_models: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone, Default)]
pub struct HealthConfig {
    pub required_capabilities: CapabilitySet,
}

/// Aggregates health information from runtime components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Generate full health report.
    pub fn report(
        &self,
        modules: &ModuleRegistry,
        services: &ServiceRegistry,
        lifecycle: &ModelLifecycleTracker,
    ) -> HealthReport {
        let providers_per_capability: BTreeMap<_, _> = Capability::ALL
            .iter()
            .map(|cap| (cap.as_str(), services.list_providers(*cap).len()))
            .collect();

        let missing_capabilities: Vec<_> = self
            .config
            .required_capabilities
            .iter()
            .filter(|cap| !services.has_provider(*cap))
            .map(|cap| cap.as_str())
            .collect();

        let tracked = lifecycle.tracked_models();
        let loaded_models = tracked.iter().filter(|e| e.state.is_loaded()).count();
        let failed_models = tracked
            .iter()
            .filter(|e| matches!(e.state, ModelLoadState::Error { .. }))
            .count();

        let state = self.compute_state(missing_capabilities.len(), failed_models);

        HealthReport {
            state,
            modules: modules.len(),
            providers_per_capability,
            missing_capabilities,
            live_services: services.live_service_count(),
            loaded_models,
            failed_models,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, missing: usize, failed_models: usize) -> HealthState {
        let required = self.config.required_capabilities.iter().count();
        if required > 0 && missing == required {
            return HealthState::Unhealthy;
        }
        if missing > 0 || failed_models > 0 {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
