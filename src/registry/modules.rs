//! Registry of backend modules and the capabilities they advertise.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilitySet};
use crate::error::CoreError;

/// Priority given to modules and providers that do not set one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Identity and advertised capabilities of a backend module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub capabilities: CapabilitySet,
    pub priority: i32,
}

impl ModuleInfo {
    pub fn new(id: impl Into<String>, capabilities: CapabilitySet) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: String::new(),
            description: String::new(),
            capabilities,
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

struct ModuleEntry {
    seq: u64,
    info: ModuleInfo,
}

#[derive(Default)]
struct ModuleTable {
    modules: HashMap<String, ModuleEntry>,
    next_seq: u64,
}

impl ModuleTable {
    /// Entries in registration order.
    fn ordered(&self) -> Vec<&ModuleEntry> {
        let mut entries: Vec<_> = self.modules.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }
}

/// Thread-safe, id-keyed store of registered modules.
pub struct ModuleRegistry {
    inner: Mutex<ModuleTable>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(ModuleTable::default()) }
    }

    /// Register a module. Fails if the id is already present.
    pub fn register(&self, info: ModuleInfo) -> Result<(), CoreError> {
        if info.id.is_empty() {
            return Err(CoreError::InvalidArgument("module id must not be empty".into()));
        }

        let mut table = self.inner.lock();
        if table.modules.contains_key(&info.id) {
            tracing::warn!(module_id = %info.id, "Module already registered, skipping");
            return Err(CoreError::AlreadyRegistered(info.id));
        }

        let seq = table.next_seq;
        table.next_seq += 1;
        tracing::info!(module_id = %info.id, version = %info.version, "Module registered");
        table.modules.insert(info.id.clone(), ModuleEntry { seq, info });
        Ok(())
    }

    /// Remove a module, returning its info.
    pub fn unregister(&self, id: &str) -> Result<ModuleInfo, CoreError> {
        let removed = self.inner.lock().modules.remove(id);
        match removed {
            Some(entry) => {
                tracing::info!(module_id = %id, "Module unregistered");
                Ok(entry.info)
            }
            None => Err(CoreError::module_not_found(id)),
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.inner.lock().modules.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<ModuleInfo> {
        self.inner.lock().modules.get(id).map(|e| e.info.clone())
    }

    /// Snapshot of all modules in registration order.
    pub fn list(&self) -> Vec<ModuleInfo> {
        self.inner.lock().ordered().into_iter().map(|e| e.info.clone()).collect()
    }

    /// Ids of modules advertising `capability`, highest priority first.
    ///
    /// Equal priorities keep registration order.
    pub fn modules_for_capability(&self, capability: Capability) -> Vec<String> {
        let table = self.inner.lock();
        let mut matching: Vec<_> = table
            .ordered()
            .into_iter()
            .filter(|e| e.info.capabilities.contains(capability))
            .collect();
        // sort_by is stable, so ties stay in registration order
        matching.sort_by(|a, b| b.info.priority.cmp(&a.info.priority));
        matching.into_iter().map(|e| e.info.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every module.
    pub fn reset(&self) {
        let mut table = self.inner.lock();
        table.modules.clear();
        table.next_seq = 0;
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
