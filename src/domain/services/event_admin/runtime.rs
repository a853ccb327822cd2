//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name               | Description                                            | Key Methods       |
// |--------------------|--------------------------------------------------------|-------------------|
// | EventAdminRuntime  | Lifecycle and configuration owner of the engine        | start, stop,      |
// |                    |                                                        | reconfigure,      |
// |                    |                                                        | send_event,       |
// |                    |                                                        | post_event        |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::EventAdminConfig;
use crate::domain::models::{ComponentId, Event, Properties};
use crate::domain::services::registry::SubscriberRegistry;
use crate::domain::services::security::AuthorizationSource;

use super::{EventAdmin, EventAdminError, EventAdminImpl, EventAdminResult};

enum RuntimeState {
    Idle,
    Running(Arc<EventAdminImpl>),
    Stopped,
}

/// Long-lived handle publishers hold on to.
///
/// The runtime owns the configuration and the current engine instance.
/// Reconfiguring stops the running instance and swaps in a fresh one, so
/// caches, blacklist and pools never outlive the configuration they were
/// built for. A publish racing with a reconfiguration may fail with
/// [`EventAdminError::Stopped`].
pub struct EventAdminRuntime {
    registry: Arc<dyn SubscriberRegistry>,
    authorization: Option<Arc<dyn AuthorizationSource>>,
    config: RwLock<EventAdminConfig>,
    state: RwLock<RuntimeState>,
}

impl EventAdminRuntime {
    /// Creates a runtime that is not started yet.
    ///
    /// # Arguments
    /// * `config` - Initial configuration
    /// * `registry` - Source of the registered subscribers
    pub fn new(config: EventAdminConfig, registry: Arc<dyn SubscriberRegistry>) -> Self {
        Self {
            registry,
            authorization: None,
            config: RwLock::new(config),
            state: RwLock::new(RuntimeState::Idle),
        }
    }

    /// Enables topic permission checks against `source`.
    pub fn with_authorization(mut self, source: Arc<dyn AuthorizationSource>) -> Self {
        self.authorization = Some(source);
        self
    }

    /// Starts an engine with the current configuration.
    ///
    /// Starting a running runtime has no effect; starting a stopped one
    /// builds a fresh engine.
    pub fn start(&self) {
        let mut state = self.state.write();
        if let RuntimeState::Running(_) = *state {
            debug!("Event admin already running");
            return;
        }
        *state = RuntimeState::Running(self.build_engine());
        info!("Event admin started");
    }

    /// Stops the running engine. Calling `stop` more than once has no
    /// further effect.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), RuntimeState::Stopped);
        if let RuntimeState::Running(engine) = previous {
            engine.stop();
        }
    }

    /// Replaces the configuration. A running engine is stopped and a new one
    /// is started with the new values.
    pub fn reconfigure(&self, config: EventAdminConfig) {
        let mut state = self.state.write();
        *self.config.write() = config;

        if let RuntimeState::Running(previous) = &*state {
            previous.stop();
            *state = RuntimeState::Running(self.build_engine());
            info!("Event admin reconfigured");
        } else {
            debug!("Event admin configuration updated while not running");
        }
    }

    /// Applies configuration properties, see [`EventAdminConfig::from_properties`].
    pub fn update(&self, properties: &HashMap<String, String>) {
        self.reconfigure(EventAdminConfig::from_properties(properties));
    }

    /// Returns the current configuration.
    pub fn config(&self) -> EventAdminConfig {
        self.config.read().clone()
    }

    /// Returns the running engine instance.
    ///
    /// # Returns
    /// * `Ok(engine)` - The engine currently serving publishes
    /// * `Err(EventAdminError::NotStarted)` - `start` was never called
    /// * `Err(EventAdminError::Stopped)` - The runtime has been stopped
    pub fn engine(&self) -> EventAdminResult<Arc<EventAdminImpl>> {
        match &*self.state.read() {
            RuntimeState::Running(engine) => Ok(Arc::clone(engine)),
            RuntimeState::Idle => Err(EventAdminError::NotStarted),
            RuntimeState::Stopped => Err(EventAdminError::Stopped),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.read(), RuntimeState::Running(_))
    }

    /// Builds an event and delivers it synchronously.
    ///
    /// # Arguments
    /// * `topic` - Event topic, validated before publishing
    /// * `properties` - Event properties
    pub fn send_event(&self, topic: &str, properties: Properties) -> EventAdminResult<()> {
        self.publish_sync(Event::new(topic, properties)?)
    }

    /// Builds an event and delivers it asynchronously.
    ///
    /// # Arguments
    /// * `topic` - Event topic, validated before publishing
    /// * `properties` - Event properties
    pub fn post_event(&self, topic: &str, properties: Properties) -> EventAdminResult<()> {
        self.publish_async(Event::new(topic, properties)?)
    }

    /// Synchronous publish checked against the publisher's permission.
    pub fn publish_sync_as(&self, publisher: &ComponentId, event: Event) -> EventAdminResult<()> {
        self.engine()?.publish_sync_as(publisher, event)
    }

    /// Asynchronous publish checked against the publisher's permission.
    pub fn publish_async_as(&self, publisher: &ComponentId, event: Event) -> EventAdminResult<()> {
        self.engine()?.publish_async_as(publisher, event)
    }

    fn build_engine(&self) -> Arc<EventAdminImpl> {
        Arc::new(EventAdminImpl::new(
            self.config(),
            Arc::clone(&self.registry),
            self.authorization.clone(),
        ))
    }
}

impl EventAdmin for EventAdminRuntime {
    fn publish_sync(&self, event: Event) -> EventAdminResult<()> {
        self.engine()?.publish_sync(event)
    }

    fn publish_async(&self, event: Event) -> EventAdminResult<()> {
        self.engine()?.publish_async(event)
    }
}

impl Drop for EventAdminRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}
