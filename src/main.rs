//--------------------------------------------------------------------------------------------------
// EVENT ADMIN DEMO
//--------------------------------------------------------------------------------------------------
// Starts an event admin configured from the environment, registers a few subscribers and
// publishes a burst of events synchronously and asynchronously.
//
// | Component             | Description                                                     |
// |-----------------------|-----------------------------------------------------------------|
// | ConsoleEventHandler   | Prints every received event as JSON                             |
// | Args                  | Command line options                                            |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};

use event_admin::{
    Event, EventAdmin, EventAdminConfig, EventAdminRuntime, EventHandler, Properties, Subscriber,
    SubscriberTable,
};

/// Command line arguments for the demo
#[derive(Parser, Debug)]
#[command(author, version, about = "In-process publish/subscribe event admin demo")]
struct Args {
    /// Number of events to publish per mode
    #[arg(short, long, default_value = "5")]
    events: usize,

    /// Topic the events are published to
    #[arg(short, long, default_value = "com/example/Order")]
    topic: String,

    /// Handler delay in milliseconds for the slow subscriber (0 to skip it)
    #[arg(short, long, default_value = "0")]
    slow_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Simple event handler that prints events to the console
struct ConsoleEventHandler {
    name: &'static str,
}

impl EventHandler for ConsoleEventHandler {
    fn handle_event(&self, event: &Event) -> Result<()> {
        println!("[{}] {}", self.name, serde_json::to_string(event)?);
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = EventAdminConfig::from_env();
    info!("Starting event admin demo with {:?}", config);

    let registry = Arc::new(SubscriberTable::new());
    registry.register(
        Subscriber::new(Arc::new(ConsoleEventHandler { name: "all" })).with_topics(["*"]),
    );
    registry.register(
        Subscriber::new(Arc::new(ConsoleEventHandler { name: "large" }))
            .with_topics(["com/example/*"])
            .with_filter("(amount>=100)"),
    );
    if args.slow_ms > 0 {
        let delay = Duration::from_millis(args.slow_ms);
        registry.register(
            Subscriber::new(Arc::new(move |_: &Event| -> Result<()> {
                thread::sleep(delay);
                Ok(())
            }))
            .with_topics(["*"]),
        );
    }

    let runtime = EventAdminRuntime::new(config, registry);
    runtime.start();

    let started = Instant::now();
    for i in 0..args.events {
        let mut properties = Properties::new();
        properties.insert("sequence".to_string(), (i as i64).into());
        properties.insert("amount".to_string(), ((i as i64) * 50).into());
        runtime.send_event(&args.topic, properties)?;
    }
    info!("Sent {} events in {:?}", args.events, started.elapsed());

    let started = Instant::now();
    for i in 0..args.events {
        let event = Event::with_topic(args.topic.as_str())?
            .with_property("sequence", i as i64)
            .with_property("mode", "async");
        runtime.publish_async(event)?;
    }
    info!("Posted {} events in {:?}", args.events, started.elapsed());

    // Allow posted events to be delivered
    thread::sleep(Duration::from_millis(200));
    runtime.stop();

    info!("Demo completed");
    Ok(())
}
