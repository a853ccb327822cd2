//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                           | Key Methods            |
// |---------------|-------------------------------------------------------|------------------------|
// | WorkerPool    | Shared handle to a lazily growing thread pool         | submit, execute, close |
// | TaskHandle    | Completion signal of a submitted task                 | wait, wait_timeout     |
//--------------------------------------------------------------------------------------------------

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

use super::{Discipline, PoolError, TaskOutcome};

/// How long an idle borrow-or-create worker waits for work before exiting.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

struct Envelope {
    job: Job,
    reply: Option<Sender<TaskOutcome>>,
}

thread_local! {
    static BORROWED_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Returns true when called from a thread of a borrow-or-create pool, i.e.
/// from inside a handler invocation.
pub fn on_borrowed_worker() -> bool {
    BORROWED_WORKER.with(Cell::get)
}

#[derive(Debug)]
struct PoolState {
    /// Threads alive, busy or idle
    live: usize,
    /// Threads waiting for work that no submitter has claimed
    idle: usize,
    /// Queued tasks not yet picked up (queued discipline only)
    pending: usize,
    closed: bool,
    sender: Option<Sender<Envelope>>,
    spawned: usize,
}

struct PoolInner {
    name: String,
    discipline: Discipline,
    max_threads: usize,
    keep_alive: Duration,
    state: Mutex<PoolState>,
    worker_freed: Condvar,
    receiver: Receiver<Envelope>,
}

/// A bounded pool of reusable worker threads.
///
/// Cloning yields another handle to the same pool. Closing is explicit; worker
/// threads are detached and never interrupted mid-task.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Creates a pool. No thread is spawned until work arrives.
    ///
    /// # Arguments
    /// * `name` - Prefix of the worker thread names
    /// * `max_threads` - Upper bound on live threads (at least one)
    /// * `discipline` - How tasks are handed to threads
    pub fn new(name: impl Into<String>, max_threads: usize, discipline: Discipline) -> Self {
        Self::with_keep_alive(name, max_threads, discipline, DEFAULT_KEEP_ALIVE)
    }

    /// Creates a pool whose idle borrow-or-create workers exit after `keep_alive`.
    pub fn with_keep_alive(
        name: impl Into<String>,
        max_threads: usize,
        discipline: Discipline,
        keep_alive: Duration,
    ) -> Self {
        let (sender, receiver) = unbounded();
        let name = name.into();
        let max_threads = max_threads.max(1);
        debug!(
            "Created worker pool {} ({:?}, max {} threads)",
            name, discipline, max_threads
        );
        Self {
            inner: Arc::new(PoolInner {
                name,
                discipline,
                max_threads,
                keep_alive,
                state: Mutex::new(PoolState {
                    live: 0,
                    idle: 0,
                    pending: 0,
                    closed: false,
                    sender: Some(sender),
                    spawned: 0,
                }),
                worker_freed: Condvar::new(),
                receiver,
            }),
        }
    }

    /// Submits a task and returns its completion handle.
    ///
    /// With [`Discipline::BorrowOrCreate`] this blocks while every worker is
    /// busy and the pool is at capacity. With [`Discipline::Queued`] it never
    /// blocks.
    pub fn submit<F>(&self, task: F) -> Result<TaskHandle, PoolError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let (reply, outcome) = bounded(1);
        self.dispatch(Envelope {
            job: Box::new(task),
            reply: Some(reply),
        })?;
        Ok(TaskHandle { outcome })
    }

    /// Submits a task without a completion handle. Failures are logged.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.dispatch(Envelope {
            job: Box::new(task),
            reply: None,
        })
    }

    fn dispatch(&self, envelope: Envelope) -> Result<(), PoolError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        match inner.discipline {
            Discipline::BorrowOrCreate => loop {
                if state.closed {
                    return Err(PoolError::Closed(inner.name.clone()));
                }
                if state.idle > 0 {
                    state.idle -= 1;
                    break;
                }
                if state.live < inner.max_threads {
                    self.spawn_worker(&mut state)?;
                    break;
                }
                trace!("Pool {} at capacity, waiting for a free worker", inner.name);
                inner.worker_freed.wait(&mut state);
            },
            Discipline::Queued => {
                if state.closed {
                    return Err(PoolError::Closed(inner.name.clone()));
                }
                state.pending += 1;
                if state.pending > state.idle && state.live < inner.max_threads {
                    if let Err(e) = self.spawn_worker(&mut state) {
                        // Existing workers will get to the task eventually
                        if state.live == 0 {
                            state.pending -= 1;
                            return Err(e);
                        }
                        debug!("Pool {} could not grow: {}", inner.name, e);
                    }
                }
            }
        }

        match &state.sender {
            Some(sender) => sender
                .send(envelope)
                .map_err(|_| PoolError::Closed(inner.name.clone())),
            None => Err(PoolError::Closed(inner.name.clone())),
        }
    }

    fn spawn_worker(&self, state: &mut PoolState) -> Result<(), PoolError> {
        let inner = Arc::clone(&self.inner);
        let thread_name = format!("{}-{}", self.inner.name, state.spawned);
        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker_loop(inner))
            .map_err(|e| PoolError::Spawn {
                pool: self.inner.name.clone(),
                reason: e.to_string(),
            })?;
        state.live += 1;
        state.spawned += 1;
        trace!("Spawned worker {} ({} live)", thread_name, state.live);
        Ok(())
    }

    /// Stops accepting work and releases idle threads.
    ///
    /// Running tasks finish normally. Queued tasks that have not started are
    /// dropped. Calling `close` more than once has no further effect.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.sender = None;
        self.inner.worker_freed.notify_all();
        debug!(
            "Closed worker pool {} ({} live threads)",
            self.inner.name, state.live
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn discipline(&self) -> Discipline {
        self.inner.discipline
    }

    pub fn max_threads(&self) -> usize {
        self.inner.max_threads
    }

    pub fn live_threads(&self) -> usize {
        self.inner.state.lock().live
    }

    pub fn idle_threads(&self) -> usize {
        self.inner.state.lock().idle
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("discipline", &self.inner.discipline)
            .field("max_threads", &self.inner.max_threads)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    if inner.discipline == Discipline::BorrowOrCreate {
        BORROWED_WORKER.with(|flag| flag.set(true));
    } else {
        // A queued worker is idle until it picks up its first task
        inner.state.lock().idle += 1;
    }

    loop {
        let received = match inner.discipline {
            Discipline::BorrowOrCreate => inner.receiver.recv_timeout(inner.keep_alive),
            Discipline::Queued => inner
                .receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        let envelope = match received {
            Ok(envelope) => envelope,
            Err(RecvTimeoutError::Timeout) => {
                let mut state = inner.state.lock();
                // Only leave if nobody claimed this worker in the meantime
                if state.idle > 0 {
                    state.idle -= 1;
                    state.live -= 1;
                    trace!("Idle worker of pool {} exiting ({} live)", inner.name, state.live);
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                let mut state = inner.state.lock();
                state.idle = state.idle.saturating_sub(1);
                state.live -= 1;
                inner.worker_freed.notify_all();
                return;
            }
        };

        if inner.discipline == Discipline::Queued {
            let mut state = inner.state.lock();
            state.idle -= 1;
            state.pending -= 1;
            if state.closed {
                // Queued work that has not started is dropped on close
                state.idle += 1;
                debug!("Dropping queued task of closed pool {}", inner.name);
                continue;
            }
        }

        let Envelope { job, reply } = envelope;
        let outcome = run_task(job);

        // Become available before signalling completion, so a caller that
        // submits right after waiting reuses this thread
        {
            let mut state = inner.state.lock();
            state.idle += 1;
            inner.worker_freed.notify_one();
        }

        report(&inner.name, outcome, reply);
    }
}

fn run_task(job: Job) -> TaskOutcome {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(e)) => TaskOutcome::Failed(format!("{e:#}")),
        Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
    }
}

fn report(pool: &str, outcome: TaskOutcome, reply: Option<Sender<TaskOutcome>>) {
    match reply {
        Some(reply) => {
            if reply.send(outcome).is_err() {
                // Nobody is waiting any more (timed out); the outcome is discarded
                trace!("Discarding outcome of abandoned task in pool {}", pool);
            }
        }
        None => {
            if outcome != TaskOutcome::Completed {
                error!("Task in pool {} {}", pool, outcome);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Completion signal of a task submitted with [`WorkerPool::submit`].
#[derive(Debug)]
pub struct TaskHandle {
    outcome: Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// Blocks until the task has finished.
    pub fn wait(self) -> TaskOutcome {
        self.outcome.recv().unwrap_or(TaskOutcome::Abandoned)
    }

    /// Waits at most `timeout` for the task to finish.
    ///
    /// # Returns
    /// * `Some(outcome)` - The task finished (or was dropped) in time
    /// * `None` - The timeout elapsed; the task keeps running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskOutcome> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(TaskOutcome::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_borrow_pool_grows_lazily_and_reuses_threads() {
        let pool = WorkerPool::new("test-borrow", 4, Discipline::BorrowOrCreate);
        assert_eq!(pool.live_threads(), 0);

        for _ in 0..10 {
            let outcome = pool.submit(|| Ok(())).unwrap().wait();
            assert_eq!(outcome, TaskOutcome::Completed);
        }
        // Sequential submissions always find the previous worker idle again
        assert_eq!(pool.live_threads(), 1);
        pool.close();
    }

    #[test]
    fn test_borrow_pool_never_exceeds_max_threads() {
        let pool = WorkerPool::new("test-capacity", 3, Discipline::BorrowOrCreate);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..9)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.submit(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.wait(), TaskOutcome::Completed);
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(pool.live_threads() <= 3);
        pool.close();
    }

    #[test]
    fn test_failures_and_panics_are_reported() {
        let pool = WorkerPool::new("test-failures", 2, Discipline::BorrowOrCreate);

        let failed = pool.submit(|| Err(anyhow::anyhow!("boom"))).unwrap().wait();
        assert_eq!(failed, TaskOutcome::Failed("boom".to_string()));

        let panicked = pool.submit(|| panic!("kaput")).unwrap().wait();
        assert_eq!(panicked, TaskOutcome::Panicked("kaput".to_string()));

        // The worker survives both
        assert_eq!(pool.submit(|| Ok(())).unwrap().wait(), TaskOutcome::Completed);
        pool.close();
    }

    #[test]
    fn test_wait_timeout_leaves_task_running() {
        let pool = WorkerPool::new("test-timeout", 2, Discipline::BorrowOrCreate);
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&finished);

        let handle = pool
            .submit(move || {
                thread::sleep(Duration::from_millis(150));
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert_eq!(handle.wait_timeout(Duration::from_millis(20)), None);
        drop(handle);

        let deadline = Instant::now() + Duration::from_secs(2);
        while finished.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        pool.close();
    }

    #[test]
    fn test_queued_pool_runs_in_fifo_order() {
        let pool = WorkerPool::new("test-queued", 1, Discipline::Queued);
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let order = Arc::clone(&order);
                pool.submit(move || {
                    order.lock().push(i);
                    Ok(())
                })
                .unwrap()
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.wait(), TaskOutcome::Completed);
        }

        assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
        pool.close();
    }

    #[test]
    fn test_closed_pool_rejects_work() {
        let pool = WorkerPool::new("test-closed", 2, Discipline::BorrowOrCreate);
        pool.close();
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(
            pool.submit(|| Ok(())).unwrap_err(),
            PoolError::Closed("test-closed".to_string())
        );

        let queued = WorkerPool::new("test-closed-queued", 2, Discipline::Queued);
        queued.close();
        assert!(queued.execute(|| Ok(())).is_err());
    }

    #[test]
    fn test_close_releases_idle_threads() {
        let pool = WorkerPool::new("test-release", 2, Discipline::BorrowOrCreate);
        pool.submit(|| Ok(())).unwrap().wait();
        assert_eq!(pool.live_threads(), 1);

        pool.close();
        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.live_threads() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.live_threads(), 0);
    }

    #[test]
    fn test_idle_workers_expire_after_keep_alive() {
        let pool = WorkerPool::with_keep_alive(
            "test-keep-alive",
            2,
            Discipline::BorrowOrCreate,
            Duration::from_millis(30),
        );
        pool.submit(|| Ok(())).unwrap().wait();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.live_threads() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.live_threads(), 0);

        // The pool grows again on demand
        assert_eq!(pool.submit(|| Ok(())).unwrap().wait(), TaskOutcome::Completed);
        pool.close();
    }

    #[test]
    fn test_worker_threads_are_flagged() {
        assert!(!on_borrowed_worker());
        let pool = WorkerPool::new("test-flag", 1, Discipline::BorrowOrCreate);
        let handle = pool
            .submit(|| {
                anyhow::ensure!(on_borrowed_worker(), "not flagged");
                Ok(())
            })
            .unwrap();
        assert_eq!(handle.wait(), TaskOutcome::Completed);
        pool.close();
    }
}
