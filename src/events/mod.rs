//! Categorized publish/subscribe events.

mod bus;
mod types;

pub use bus::{EventBus, EventCallback, SubscriptionFilter, SubscriptionId};
pub use types::{Event, EventCategory, EventDestination};
