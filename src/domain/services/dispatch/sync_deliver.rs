use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::domain::models::{Event, Subscriber};
use crate::domain::services::blacklist::Blacklist;
use crate::domain::services::worker_pool::{on_borrowed_worker, PoolError, TaskOutcome, WorkerPool};

use super::DeliverTask;

/// Configured timeouts of this many milliseconds or less disable the timeout.
pub const MIN_TIMEOUT_MS: i64 = 100;

/// Delivers an event to each handler in turn, waiting for one handler before
/// starting the next.
///
/// With a timeout every invocation runs on the borrow-or-create pool and the
/// caller waits at most `timeout` for it. A handler that overruns is
/// blacklisted and abandoned: it keeps running on its worker, its outcome is
/// discarded, and delivery moves on.
#[derive(Debug)]
pub struct SyncDeliverTask {
    pool: WorkerPool,
    timeout: Option<Duration>,
    blacklist: Arc<Blacklist>,
}

impl SyncDeliverTask {
    /// # Arguments
    /// * `pool` - Borrow-or-create pool running supervised invocations
    /// * `timeout` - Per-handler deadline, `None` to wait indefinitely
    /// * `blacklist` - Where overrunning handlers are recorded
    pub fn new(pool: WorkerPool, timeout: Option<Duration>, blacklist: Arc<Blacklist>) -> Self {
        Self {
            pool,
            timeout,
            blacklist,
        }
    }

    /// Maps a configured timeout in milliseconds to an effective deadline.
    pub fn timeout_from_millis(timeout_ms: i64) -> Option<Duration> {
        if timeout_ms <= MIN_TIMEOUT_MS {
            None
        } else {
            u64::try_from(timeout_ms).ok().map(Duration::from_millis)
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    /// Runs the handler on the calling thread.
    fn deliver_inline(&self, event: &Event, handler: &Subscriber) {
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                "Subscriber {} failed handling {}: {:#}",
                handler.id(),
                event.topic(),
                e
            ),
            Err(_) => error!("Subscriber {} panicked handling {}", handler.id(), event.topic()),
        }
    }

    /// Runs the handler on the pool and waits at most `timeout`.
    fn deliver_supervised(
        &self,
        event: &Arc<Event>,
        handler: &Subscriber,
        timeout: Duration,
    ) -> Result<(), PoolError> {
        let task_event = Arc::clone(event);
        let task_handler = handler.clone();
        let task = self.pool.submit(move || task_handler.handle(&task_event))?;

        match task.wait_timeout(timeout) {
            Some(TaskOutcome::Completed) => {}
            Some(TaskOutcome::Failed(e)) => error!(
                "Subscriber {} failed handling {}: {}",
                handler.id(),
                event.topic(),
                e
            ),
            Some(TaskOutcome::Panicked(msg)) => error!(
                "Subscriber {} panicked handling {}: {}",
                handler.id(),
                event.topic(),
                msg
            ),
            Some(TaskOutcome::Abandoned) => {
                debug!("Delivery of {} to {} was abandoned", event.topic(), handler.id())
            }
            None => {
                if self.blacklist.add(handler.id()) {
                    warn!(
                        "Subscriber {} did not return within {:?} handling {}; blacklisted",
                        handler.id(),
                        timeout,
                        event.topic()
                    );
                }
            }
        }
        Ok(())
    }
}

impl DeliverTask for SyncDeliverTask {
    fn execute(&self, event: Arc<Event>, handlers: Vec<Subscriber>) -> Result<(), PoolError> {
        for handler in &handlers {
            // Blacklisted since the handlers were resolved
            if self.blacklist.contains(&handler.id()) {
                debug!("Skipping blacklisted subscriber {}", handler.id());
                continue;
            }
            match self.timeout {
                // Nested sends from inside a handler run inline so that they
                // cannot exhaust the pool the outer handler is occupying
                Some(timeout) if !on_borrowed_worker() => {
                    self.deliver_supervised(&event, handler, timeout)?
                }
                _ => self.deliver_inline(&event, handler),
            }
        }
        Ok(())
    }
}
