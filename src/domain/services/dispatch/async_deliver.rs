use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::models::{Event, Subscriber};
use crate::domain::services::worker_pool::{PoolError, WorkerPool};

use super::DeliverTask;

struct PendingDelivery {
    event: Arc<Event>,
    handlers: Vec<Subscriber>,
}

/// Deliveries waiting to start, grouped by publishing thread.
type Chains = Arc<Mutex<HashMap<ThreadId, VecDeque<PendingDelivery>>>>;

/// Hands events off to the queued pool and returns immediately.
///
/// Events published from one thread form a chain that is worked off by a
/// single pool task, so they start (and finish) in submission order. Chains
/// of different publishing threads run concurrently.
pub struct AsyncDeliverTask {
    pool: WorkerPool,
    deliverer: Arc<dyn DeliverTask>,
    chains: Chains,
}

impl AsyncDeliverTask {
    /// # Arguments
    /// * `pool` - Queued pool running the delivery chains
    /// * `deliverer` - Delivery used for each event, usually synchronous
    pub fn new(pool: WorkerPool, deliverer: Arc<dyn DeliverTask>) -> Self {
        Self {
            pool,
            deliverer,
            chains: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the number of accepted deliveries that have not started yet.
    pub fn pending(&self) -> usize {
        self.chains.lock().values().map(VecDeque::len).sum()
    }
}

impl DeliverTask for AsyncDeliverTask {
    fn execute(&self, event: Arc<Event>, handlers: Vec<Subscriber>) -> Result<(), PoolError> {
        let publisher = thread::current().id();
        let delivery = PendingDelivery { event, handlers };

        let mut chains = self.chains.lock();
        if let Some(chain) = chains.get_mut(&publisher) {
            // A chain for this thread is running and will pick it up
            chain.push_back(delivery);
            return Ok(());
        }
        chains.insert(publisher, VecDeque::from([delivery]));

        let runner_chains = Arc::clone(&self.chains);
        let deliverer = Arc::clone(&self.deliverer);
        let pool = self.pool.clone();
        let submitted = self.pool.execute(move || {
            run_chain(publisher, &runner_chains, deliverer.as_ref(), &pool);
            Ok(())
        });

        if let Err(e) = submitted {
            chains.remove(&publisher);
            return Err(e);
        }
        Ok(())
    }
}

fn run_chain(publisher: ThreadId, chains: &Chains, deliverer: &dyn DeliverTask, pool: &WorkerPool) {
    loop {
        let next = {
            let mut chains = chains.lock();
            let Some(chain) = chains.get_mut(&publisher) else {
                return;
            };
            if pool.is_closed() {
                debug!("Dropping {} queued deliveries of a stopped event admin", chain.len());
                chains.remove(&publisher);
                return;
            }
            match chain.pop_front() {
                Some(next) => next,
                None => {
                    chains.remove(&publisher);
                    return;
                }
            }
        };

        if let Err(e) = deliverer.execute(next.event, next.handlers) {
            warn!("Asynchronous delivery interrupted: {}", e);
        }
    }
}

impl fmt::Debug for AsyncDeliverTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDeliverTask")
            .field("pool", &self.pool)
            .field("pending", &self.pending())
            .finish()
    }
}
