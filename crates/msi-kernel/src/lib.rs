//! Permission authority and event routing for the substrate: the domain table
//! that answers every capability check, and the topic-prefix event bus.

pub mod domain;
pub mod error;
pub mod event_bus;

pub use domain::{DomainManager, grant_covers};
pub use error::KernelError;
pub use event_bus::{EventBus, EventFilter, SubscriptionInfo, SubscriptionReceiver};
