// Expose the modules
pub mod config;
pub mod domain;

// Re-export key types for easier usage
pub use config::EventAdminConfig;
pub use domain::models::{
    ComponentId, Event, EventError, EventHandler, EventResult, Properties, PropertyValue, Subscriber,
    EVENT_TOPIC,
};
pub use domain::services::adapter::{AdapterSet, EventTranslator};
pub use domain::services::event_admin::{
    EventAdmin, EventAdminError, EventAdminImpl, EventAdminResult, EventAdminRuntime,
};
pub use domain::services::filter::{Filter, FilterError};
pub use domain::services::registry::{SubscriberRegistry, SubscriberTable};
pub use domain::services::security::{AuthorizationError, AuthorizationSource, TopicOperation};
