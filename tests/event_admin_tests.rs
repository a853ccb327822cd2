//--------------------------------------------------------------------------------------------------
// TEST MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Integration tests for the event admin. They drive the public runtime API only: registration,
// topic and filter matching, synchronous timing, timeouts, asynchronous ordering, permissions
// and reconfiguration.
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded};
use parking_lot::Mutex;

use event_admin::{
    AdapterSet, AuthorizationError, AuthorizationSource, ComponentId, Event, EventAdmin,
    EventAdminConfig, EventAdminError, EventAdminRuntime, Properties, PropertyValue, Subscriber,
    SubscriberTable, TopicOperation,
};

/// Sets up a started runtime over an empty subscriber table.
fn setup_runtime(config: EventAdminConfig) -> (EventAdminRuntime, Arc<SubscriberTable>) {
    let table = Arc::new(SubscriberTable::new());
    let runtime = EventAdminRuntime::new(config, table.clone());
    runtime.start();
    (runtime, table)
}

/// Subscriber appending `label:topic` to a shared log.
fn recorder(label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscriber {
    let log = Arc::clone(log);
    Subscriber::new(Arc::new(move |event: &Event| -> anyhow::Result<()> {
        log.lock().push(format!("{label}:{}", event.topic()));
        Ok(())
    }))
}

fn no_timeout() -> EventAdminConfig {
    EventAdminConfig {
        timeout_ms: 0,
        ..EventAdminConfig::default()
    }
}

#[test]
fn test_wildcard_subscription() {
    let (runtime, table) = setup_runtime(EventAdminConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    table.register(recorder("h", &log).with_topics(["com/example/*"]));

    runtime.send_event("com/example/Foo", Properties::new()).unwrap();
    runtime.send_event("com/example/deep/Bar", Properties::new()).unwrap();
    runtime.send_event("other/Bar", Properties::new()).unwrap();
    runtime.send_event("com/examples", Properties::new()).unwrap();

    assert_eq!(
        *log.lock(),
        vec!["h:com/example/Foo", "h:com/example/deep/Bar"]
    );
}

#[test]
fn test_reregistration_with_new_topics_changes_routing() {
    let (runtime, table) = setup_runtime(EventAdminConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    let subscriber = recorder("h", &log);
    let id = table.register(subscriber.clone().with_topics(["a/b"]));

    runtime.send_event("a/c", Properties::new()).unwrap();
    assert!(log.lock().is_empty());

    assert_eq!(table.register(subscriber.with_topics(["a/c"])), id);
    runtime.send_event("a/c", Properties::new()).unwrap();
    runtime.send_event("a/b", Properties::new()).unwrap();
    assert_eq!(*log.lock(), vec!["h:a/c"]);
}

#[test]
fn test_require_topic_controls_topicless_subscribers() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let (strict, table) = setup_runtime(EventAdminConfig::default());
    table.register(recorder("strict", &log));
    strict.send_event("a/b", Properties::new()).unwrap();
    assert!(log.lock().is_empty());

    let (lenient, table) = setup_runtime(EventAdminConfig {
        require_topic: false,
        ..EventAdminConfig::default()
    });
    table.register(recorder("lenient", &log));
    lenient.send_event("a/b", Properties::new()).unwrap();
    assert_eq!(*log.lock(), vec!["lenient:a/b"]);
}

#[test]
fn test_property_filters() {
    let (runtime, table) = setup_runtime(EventAdminConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    table.register(
        recorder("eur", &log)
            .with_topics(["shop/*"])
            .with_filter("(&(currency=EUR)(amount>=100))"),
    );
    table.register(recorder("broken", &log).with_topics(["shop/*"]).with_filter("(amount>="));

    let order = |currency: &str, amount: i64| {
        let mut properties = Properties::new();
        properties.insert("currency".to_string(), PropertyValue::from(currency));
        properties.insert("amount".to_string(), PropertyValue::from(amount));
        properties
    };
    runtime.send_event("shop/Order", order("EUR", 150)).unwrap();
    runtime.send_event("shop/Order", order("EUR", 50)).unwrap();
    runtime.send_event("shop/Order", order("USD", 150)).unwrap();

    assert_eq!(*log.lock(), vec!["eur:shop/Order"]);
}

#[test]
fn test_sync_delivery_without_timeout_waits_for_every_handler() {
    let (runtime, table) = setup_runtime(no_timeout());
    for _ in 0..3 {
        table.register(
            Subscriber::new(Arc::new(|_: &Event| -> anyhow::Result<()> {
                thread::sleep(Duration::from_millis(40));
                Ok(())
            }))
            .with_topics(["a/*"]),
        );
    }

    let started = Instant::now();
    runtime.send_event("a/b", Properties::new()).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(120));
}

#[test]
fn test_never_returning_handler_is_abandoned_and_blacklisted() {
    let (runtime, table) = setup_runtime(EventAdminConfig {
        timeout_ms: 150,
        ..EventAdminConfig::default()
    });
    let (release, hold) = bounded::<()>(0);
    let hung = table.register(
        Subscriber::new(Arc::new(move |_: &Event| -> anyhow::Result<()> {
            let _ = hold.recv();
            Ok(())
        }))
        .with_topics(["a/*"]),
    );

    let (tx, rx) = unbounded();
    table.register(
        Subscriber::new(Arc::new(move |_: &Event| -> anyhow::Result<()> {
            tx.send(Instant::now())?;
            Ok(())
        }))
        .with_topics(["a/*"]),
    );

    let started = Instant::now();
    runtime.send_event("a/b", Properties::new()).unwrap();
    let next_started = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let waited = next_started.duration_since(started);
    assert!(waited >= Duration::from_millis(150), "waited {waited:?}");
    assert!(waited < Duration::from_secs(1), "waited {waited:?}");

    let engine = runtime.engine().unwrap();
    assert!(engine.blacklist().contains(&hung));

    // The blacklisted handler is skipped from now on
    let started = Instant::now();
    runtime.send_event("a/b", Properties::new()).unwrap();
    assert!(started.elapsed() < Duration::from_millis(150));
    assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());

    drop(release);
}

#[test]
fn test_failing_handler_does_not_affect_others() {
    let (runtime, table) = setup_runtime(EventAdminConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    table.register(
        Subscriber::new(Arc::new(|_: &Event| -> anyhow::Result<()> {
            anyhow::bail!("cannot handle")
        }))
        .with_topics(["*"]),
    );
    table.register(
        Subscriber::new(Arc::new(|_: &Event| -> anyhow::Result<()> { panic!("crashed") }))
            .with_topics(["*"]),
    );
    table.register(recorder("ok", &log).with_topics(["*"]));

    runtime.send_event("a/b", Properties::new()).unwrap();
    runtime.post_event("a/c", Properties::new()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while log.lock().len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(*log.lock(), vec!["ok:a/b", "ok:a/c"]);
}

#[test]
fn test_post_event_is_fifo_per_publisher() {
    let (runtime, table) = setup_runtime(EventAdminConfig::default());
    let received = Arc::new(Mutex::new(Vec::new()));
    let count = Arc::new(AtomicUsize::new(0));
    {
        let received = Arc::clone(&received);
        let count = Arc::clone(&count);
        table.register(
            Subscriber::new(Arc::new(move |event: &Event| -> anyhow::Result<()> {
                if let Some(seq) = event.property("seq").and_then(PropertyValue::as_i64) {
                    received.lock().push(seq);
                }
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .with_topics(["fifo/*"]),
        );
    }

    let started = Instant::now();
    for seq in 0..100 {
        let event = Event::with_topic("fifo/Event").unwrap().with_property("seq", seq as i64);
        runtime.publish_async(event).unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    let deadline = Instant::now() + Duration::from_secs(5);
    while count.load(Ordering::SeqCst) < 100 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(*received.lock(), (0..100).collect::<Vec<i64>>());
}

#[test]
fn test_nested_send_from_handler() {
    let table = Arc::new(SubscriberTable::new());
    let runtime = Arc::new(EventAdminRuntime::new(
        EventAdminConfig {
            thread_pool_size: 2,
            ..EventAdminConfig::default()
        },
        table.clone(),
    ));
    runtime.start();

    let log = Arc::new(Mutex::new(Vec::new()));
    table.register(recorder("inner", &log).with_topics(["inner/*"]));

    let publisher = Arc::clone(&runtime);
    table.register(
        Subscriber::new(Arc::new(move |_: &Event| -> anyhow::Result<()> {
            publisher.send_event("inner/Ping", Properties::new())?;
            Ok(())
        }))
        .with_topics(["outer/*"]),
    );

    // More nested sends than the pool has threads
    for _ in 0..4 {
        runtime.send_event("outer/Ping", Properties::new()).unwrap();
    }
    assert_eq!(log.lock().len(), 4);
    runtime.stop();
}

struct TopicPrefixAuthorization {
    prefix: &'static str,
    checks: AtomicUsize,
}

impl AuthorizationSource for TopicPrefixAuthorization {
    fn check_permission(
        &self,
        _principal: &ComponentId,
        topic: &str,
        operation: TopicOperation,
    ) -> Result<bool, AuthorizationError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match operation {
            TopicOperation::Publish => Ok(topic.starts_with(self.prefix)),
            TopicOperation::Subscribe => Ok(true),
        }
    }
}

#[test]
fn test_publish_permissions() {
    let table = Arc::new(SubscriberTable::new());
    let authorization = Arc::new(TopicPrefixAuthorization {
        prefix: "public/",
        checks: AtomicUsize::new(0),
    });
    let runtime = EventAdminRuntime::new(EventAdminConfig::default(), table.clone())
        .with_authorization(authorization.clone());
    runtime.start();

    let log = Arc::new(Mutex::new(Vec::new()));
    table.register(recorder("h", &log).with_topics(["*"]));
    let publisher = ComponentId::new();

    for _ in 0..5 {
        runtime
            .publish_sync_as(&publisher, Event::with_topic("public/News").unwrap())
            .unwrap();
    }
    let denied = runtime.publish_sync_as(&publisher, Event::with_topic("secret/Plan").unwrap());
    assert!(matches!(denied, Err(EventAdminError::PublishDenied { .. })));

    assert_eq!(log.lock().len(), 5);
    // One publish and one subscribe check per topic, then cached
    assert_eq!(authorization.checks.load(Ordering::SeqCst), 3);
}

#[test]
fn test_update_rebuilds_engine_and_clears_blacklist() {
    let (runtime, table) = setup_runtime(EventAdminConfig {
        timeout_ms: 150,
        ..EventAdminConfig::default()
    });
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let slow = table.register(
        Subscriber::new(Arc::new(move |_: &Event| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            Ok(())
        }))
        .with_topics(["a/*"]),
    );

    runtime.send_event("a/b", Properties::new()).unwrap();
    assert!(runtime.engine().unwrap().blacklist().contains(&slow));

    let mut properties = HashMap::new();
    properties.insert("EVENT_ADMIN_TIMEOUT".to_string(), "0".to_string());
    runtime.update(&properties);
    assert_eq!(runtime.config().timeout(), None);
    assert!(!runtime.engine().unwrap().blacklist().contains(&slow));

    // Without a timeout the handler runs to completion again
    let started = Instant::now();
    runtime.send_event("a/b", Properties::new()).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_lifecycle() {
    let table = Arc::new(SubscriberTable::new());
    let runtime = EventAdminRuntime::new(EventAdminConfig::default(), table);
    assert_eq!(
        runtime.post_event("a/b", Properties::new()),
        Err(EventAdminError::NotStarted)
    );
    runtime.start();
    assert!(runtime.post_event("a/b", Properties::new()).is_ok());
    runtime.stop();
    assert_eq!(
        runtime.send_event("a/b", Properties::new()),
        Err(EventAdminError::Stopped)
    );
    assert!(matches!(
        runtime.send_event("bad topic", Properties::new()),
        Err(EventAdminError::InvalidEvent(_))
    ));
}

#[test]
fn test_adapters_forward_through_runtime() {
    let (runtime, table) = setup_runtime(EventAdminConfig::default());
    let (tx, rx) = unbounded();
    table.register(
        Subscriber::new(Arc::new(move |event: &Event| -> anyhow::Result<()> {
            tx.send(event.topic().to_string())?;
            Ok(())
        }))
        .with_topics(["host/*"]),
    );

    let adapters: AdapterSet<String> = AdapterSet::new();
    adapters.register(Arc::new(|message: &String| {
        Event::with_topic("host/log/INFO")
            .ok()
            .map(|event| event.with_property("message", message.as_str()))
    }));

    assert_eq!(adapters.forward(&"disk almost full".to_string(), &runtime), 1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "host/log/INFO");
}
