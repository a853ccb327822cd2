pub mod event;
pub mod subscriber;

pub use event::{Event, EventError, EventResult, Properties, PropertyValue, EVENT_TOPIC};
pub use subscriber::{ComponentId, EventHandler, Subscriber};
