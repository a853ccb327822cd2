//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name            | Description                                              | Key Methods      |
// |-----------------|----------------------------------------------------------|------------------|
// | EventAdminImpl  | Engine instance owning caches, blacklist and pools       | publish_sync,    |
// |                 |                                                          | publish_async,   |
// |                 |                                                          | stop             |
//--------------------------------------------------------------------------------------------------

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, trace};

use crate::config::EventAdminConfig;
use crate::domain::models::{ComponentId, Event, Subscriber};
use crate::domain::services::blacklist::Blacklist;
use crate::domain::services::cache::LeastRecentlyUsedCache;
use crate::domain::services::dispatch::{AsyncDeliverTask, DeliverTask, SyncDeliverTask};
use crate::domain::services::filter::CachedFilters;
use crate::domain::services::handler_resolver::{BlacklistingHandlerResolver, HandlerResolver};
use crate::domain::services::registry::SubscriberRegistry;
use crate::domain::services::security::{AuthorizationSource, CachedTopicPermissions, TopicOperation};
use crate::domain::services::topic::CachedTopicHandlerFilters;
use crate::domain::services::worker_pool::{Discipline, PoolError, WorkerPool};

use super::{EventAdmin, EventAdminError, EventAdminResult};

const SYNC_POOL_NAME: &str = "event-admin-sync";
const ASYNC_POOL_NAME: &str = "event-admin-async";

/// One running instance of the event engine.
///
/// Every cache, the blacklist and both pools belong to the instance; a
/// reconfiguration builds a fresh one instead of mutating this one.
pub struct EventAdminImpl {
    config: EventAdminConfig,
    registry: Arc<dyn SubscriberRegistry>,
    resolver: BlacklistingHandlerResolver,
    publish_permissions: CachedTopicPermissions,
    sync_pool: WorkerPool,
    async_pool: WorkerPool,
    sync_deliverer: Arc<SyncDeliverTask>,
    async_deliverer: AsyncDeliverTask,
    running: AtomicBool,
}

impl EventAdminImpl {
    /// Creates and starts an engine instance. Worker threads are spawned on
    /// first use.
    ///
    /// # Arguments
    /// * `config` - Effective configuration
    /// * `registry` - Source of the registered subscribers
    /// * `authorization` - Topic permission source, `None` to allow everything
    pub fn new(
        config: EventAdminConfig,
        registry: Arc<dyn SubscriberRegistry>,
        authorization: Option<Arc<dyn AuthorizationSource>>,
    ) -> Self {
        let cache_size = config.cache_size;
        let blacklist = Arc::new(Blacklist::new());

        let resolver = BlacklistingHandlerResolver::new(
            Arc::clone(&blacklist),
            CachedTopicHandlerFilters::new(LeastRecentlyUsedCache::new(cache_size), config.require_topic),
            CachedFilters::new(LeastRecentlyUsedCache::new(cache_size)),
            CachedTopicPermissions::new(
                authorization.clone(),
                LeastRecentlyUsedCache::new(cache_size),
                TopicOperation::Subscribe,
            ),
        );
        let publish_permissions = CachedTopicPermissions::new(
            authorization,
            LeastRecentlyUsedCache::new(cache_size),
            TopicOperation::Publish,
        );

        let sync_pool = WorkerPool::new(SYNC_POOL_NAME, config.thread_pool_size, Discipline::BorrowOrCreate);
        let async_pool = WorkerPool::new(ASYNC_POOL_NAME, config.async_pool_size(), Discipline::Queued);

        let sync_deliverer = Arc::new(SyncDeliverTask::new(
            sync_pool.clone(),
            config.timeout(),
            Arc::clone(&blacklist),
        ));
        let async_deliverer = AsyncDeliverTask::new(
            async_pool.clone(),
            Arc::clone(&sync_deliverer) as Arc<dyn DeliverTask>,
        );

        debug!(
            "Starting event admin: cache size {}, thread pool size {}, async pool size {}, timeout {} ms ({}), require topic {}",
            config.cache_size,
            config.thread_pool_size,
            config.async_pool_size(),
            config.timeout_ms,
            if config.timeout().is_some() { "enabled" } else { "disabled" },
            config.require_topic
        );

        Self {
            config,
            registry,
            resolver,
            publish_permissions,
            sync_pool,
            async_pool,
            sync_deliverer,
            async_deliverer,
            running: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &EventAdminConfig {
        &self.config
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        self.sync_deliverer.blacklist()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Publishes synchronously on behalf of `publisher`, checking its publish
    /// permission first.
    pub fn publish_sync_as(&self, publisher: &ComponentId, event: Event) -> EventAdminResult<()> {
        self.check_publish_permission(publisher, &event)?;
        self.publish_sync(event)
    }

    /// Publishes asynchronously on behalf of `publisher`, checking its publish
    /// permission first.
    pub fn publish_async_as(&self, publisher: &ComponentId, event: Event) -> EventAdminResult<()> {
        self.check_publish_permission(publisher, &event)?;
        self.publish_async(event)
    }

    /// Stops the instance. Running handlers finish; queued asynchronous
    /// deliveries that have not started are dropped.
    ///
    /// Calling `stop` more than once has no further effect.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.async_pool.close();
        self.sync_pool.close();
        info!(
            "Event admin stopped ({} subscribers blacklisted)",
            self.blacklist().len()
        );
    }

    fn check_publish_permission(&self, publisher: &ComponentId, event: &Event) -> EventAdminResult<()> {
        if self.publish_permissions.has_permission(publisher, event.topic()) {
            Ok(())
        } else {
            debug!("Publisher {} denied for topic {}", publisher, event.topic());
            Err(EventAdminError::PublishDenied {
                principal: *publisher,
                topic: event.topic().to_string(),
            })
        }
    }

    /// Resolves the handlers of an event against the current registrations.
    ///
    /// # Returns
    /// * `Ok(handlers)` - The handlers to notify, possibly empty
    /// * `Err(EventAdminError::Stopped)` - The instance has been stopped
    fn resolve(&self, event: &Event) -> EventAdminResult<Vec<Subscriber>> {
        if !self.is_running() {
            return Err(EventAdminError::Stopped);
        }
        let candidates = self.registry.snapshot();
        Ok(self.resolver.resolve(event, &candidates))
    }
}

/// Maps a pool failure to what the publisher sees. Only a closed pool means
/// the engine was stopped.
fn delivery_error(e: PoolError) -> EventAdminError {
    match e {
        PoolError::Closed(pool) => {
            debug!("Delivery rejected by closed pool {}", pool);
            EventAdminError::Stopped
        }
        e @ PoolError::Spawn { .. } => {
            error!("Delivery could not be started: {}", e);
            EventAdminError::DeliveryFailed(e)
        }
    }
}

impl EventAdmin for EventAdminImpl {
    fn publish_sync(&self, event: Event) -> EventAdminResult<()> {
        let handlers = self.resolve(&event)?;
        if handlers.is_empty() {
            trace!("No handlers for {}", event.topic());
            return Ok(());
        }
        self.sync_deliverer
            .execute(Arc::new(event), handlers)
            .map_err(delivery_error)
    }

    fn publish_async(&self, event: Event) -> EventAdminResult<()> {
        let handlers = self.resolve(&event)?;
        if handlers.is_empty() {
            trace!("No handlers for {}", event.topic());
            return Ok(());
        }
        self.async_deliverer
            .execute(Arc::new(event), handlers)
            .map_err(delivery_error)
    }
}

impl Drop for EventAdminImpl {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for EventAdminImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAdminImpl")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("sync_pool", &self.sync_pool)
            .field("async_pool", &self.async_pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EventHandler;
    use crate::domain::services::registry::SubscriberTable;
    use crate::domain::services::security::{AuthorizationError, MockAuthorizationSource};
    use crossbeam_channel::unbounded;
    use parking_lot::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    fn recording(log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn EventHandler> {
        let log = Arc::clone(log);
        Arc::new(move |event: &Event| -> anyhow::Result<()> {
            log.lock().push(event.topic().to_string());
            Ok(())
        })
    }

    fn engine(
        config: EventAdminConfig,
        authorization: Option<Arc<dyn AuthorizationSource>>,
    ) -> (EventAdminImpl, Arc<SubscriberTable>) {
        let table = Arc::new(SubscriberTable::new());
        let registry: Arc<dyn SubscriberRegistry> = Arc::clone(&table) as Arc<dyn SubscriberRegistry>;
        (EventAdminImpl::new(config, registry, authorization), table)
    }

    #[test]
    fn test_publish_sync_reaches_matching_subscribers_only() {
        let (admin, table) = engine(EventAdminConfig::default(), None);
        let log = Arc::new(Mutex::new(Vec::new()));
        table.register(Subscriber::new(recording(&log)).with_topics(["com/example/*"]));

        admin.publish_sync(Event::with_topic("com/example/Foo").unwrap()).unwrap();
        admin.publish_sync(Event::with_topic("other/Bar").unwrap()).unwrap();

        assert_eq!(*log.lock(), vec!["com/example/Foo"]);
    }

    #[test]
    fn test_registrations_are_seen_by_later_publishes() {
        let (admin, table) = engine(EventAdminConfig::default(), None);
        let log = Arc::new(Mutex::new(Vec::new()));

        admin.publish_sync(Event::with_topic("a/b").unwrap()).unwrap();
        let id = table.register(Subscriber::new(recording(&log)).with_topics(["a/b"]));
        admin.publish_sync(Event::with_topic("a/b").unwrap()).unwrap();
        table.unregister(&id);
        admin.publish_sync(Event::with_topic("a/b").unwrap()).unwrap();

        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_publish_async_delivers_in_background() {
        let (admin, table) = engine(EventAdminConfig::default(), None);
        let (tx, rx) = unbounded();
        table.register(
            Subscriber::new(Arc::new(move |event: &Event| -> anyhow::Result<()> {
                tx.send(event.topic().to_string())?;
                Ok(())
            }))
            .with_topics(["*"]),
        );

        admin.publish_async(Event::with_topic("a/b").unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "a/b");
    }

    #[test]
    fn test_slow_handler_is_blacklisted_by_engine() {
        let config = EventAdminConfig {
            timeout_ms: 150,
            ..EventAdminConfig::default()
        };
        let (admin, table) = engine(config, None);
        let slow = table.register(
            Subscriber::new(Arc::new(|_: &Event| -> anyhow::Result<()> {
                thread::sleep(Duration::from_millis(600));
                Ok(())
            }))
            .with_topics(["a/*"]),
        );

        let started = Instant::now();
        admin.publish_sync(Event::with_topic("a/b").unwrap()).unwrap();
        assert!(started.elapsed() < Duration::from_millis(550));
        assert!(admin.blacklist().contains(&slow));

        // Never resolved again
        let started = Instant::now();
        admin.publish_sync(Event::with_topic("a/b").unwrap()).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_stop_is_idempotent_and_rejects_publishing() {
        let (admin, _table) = engine(EventAdminConfig::default(), None);
        admin.stop();
        admin.stop();

        assert!(!admin.is_running());
        assert_eq!(
            admin.publish_sync(Event::with_topic("a/b").unwrap()),
            Err(EventAdminError::Stopped)
        );
        assert_eq!(
            admin.publish_async(Event::with_topic("a/b").unwrap()),
            Err(EventAdminError::Stopped)
        );
    }

    #[test]
    fn test_only_closed_pools_report_stopped() {
        assert_eq!(
            delivery_error(PoolError::Closed(SYNC_POOL_NAME.to_string())),
            EventAdminError::Stopped
        );

        let spawn = PoolError::Spawn {
            pool: SYNC_POOL_NAME.to_string(),
            reason: "Resource temporarily unavailable".to_string(),
        };
        assert_eq!(
            delivery_error(spawn.clone()),
            EventAdminError::DeliveryFailed(spawn)
        );
    }

    #[test]
    fn test_publish_permission_is_checked_and_cached() {
        let mut source = MockAuthorizationSource::new();
        source
            .expect_check_permission()
            .withf(|_, _, op| *op == TopicOperation::Publish)
            .times(2)
            .returning(|_, topic, _| Ok(topic.starts_with("allowed/")));
        source
            .expect_check_permission()
            .withf(|_, _, op| *op == TopicOperation::Subscribe)
            .returning(|_, _, _| Ok(true));
        let (admin, table) = engine(EventAdminConfig::default(), Some(Arc::new(source)));
        let log = Arc::new(Mutex::new(Vec::new()));
        table.register(Subscriber::new(recording(&log)).with_topics(["*"]));

        let publisher = ComponentId::new();
        for _ in 0..3 {
            admin
                .publish_sync_as(&publisher, Event::with_topic("allowed/x").unwrap())
                .unwrap();
            assert_eq!(
                admin.publish_sync_as(&publisher, Event::with_topic("denied/x").unwrap()),
                Err(EventAdminError::PublishDenied {
                    principal: publisher,
                    topic: "denied/x".to_string(),
                })
            );
        }
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn test_authorization_failure_denies_publishing() {
        let mut source = MockAuthorizationSource::new();
        source
            .expect_check_permission()
            .returning(|_, _, _| Err(AuthorizationError::CheckFailed("unreachable".to_string())));
        let (admin, _table) = engine(EventAdminConfig::default(), Some(Arc::new(source)));

        let result = admin.publish_async_as(&ComponentId::new(), Event::with_topic("a/b").unwrap());
        assert!(matches!(result, Err(EventAdminError::PublishDenied { .. })));
    }
}
