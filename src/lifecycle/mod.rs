//! Model load/unload tracking per modality.

mod state;
mod tracker;

pub use state::{ModelLifecycleEntry, ModelLoadState};
pub use tracker::{
    LifecycleDestinations, ModelLifecycleTracker, EVENT_DID_LOAD, EVENT_DID_UNLOAD,
    EVENT_LOAD_FAILED, EVENT_LOAD_PROGRESS, EVENT_WILL_LOAD, EVENT_WILL_UNLOAD,
};
