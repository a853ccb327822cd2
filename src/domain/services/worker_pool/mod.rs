//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Lazily growing pool of named worker threads. The number of live threads never exceeds the
// configured maximum; threads are spawned on demand and reused.
//
// | Discipline       | submit behaviour                                                         |
// |------------------|--------------------------------------------------------------------------|
// | BorrowOrCreate   | hand to an idle worker, else spawn one, else block until a worker frees  |
// | Queued           | enqueue on a FIFO queue and return; workers pull tasks in order          |
//--------------------------------------------------------------------------------------------------

pub mod pool;

pub use pool::{on_borrowed_worker, TaskHandle, WorkerPool};

use std::fmt;

use thiserror::Error;

/// How tasks are handed to the pool's threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Caller obtains a worker immediately, blocking only at capacity
    BorrowOrCreate,
    /// Tasks are queued; workers pull them in FIFO order
    Queued,
}

/// Final state of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task returned `Ok`
    Completed,
    /// The task returned an error
    Failed(String),
    /// The task panicked
    Panicked(String),
    /// The task was dropped without running (pool closed)
    Abandoned,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Completed => f.write_str("completed"),
            TaskOutcome::Failed(e) => write!(f, "failed: {e}"),
            TaskOutcome::Panicked(msg) => write!(f, "panicked: {msg}"),
            TaskOutcome::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// Errors that can occur when submitting work to a pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been closed and accepts no new work
    #[error("Worker pool {0} is closed")]
    Closed(String),

    /// The operating system refused to spawn a worker thread
    #[error("Failed to spawn worker for pool {pool}: {reason}")]
    Spawn { pool: String, reason: String },
}
