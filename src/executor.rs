//! Pluggable thread pool abstraction the core hands reaction bodies off to.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::Error;

/// Required operations of a reaction-body scheduler.
///
/// `submit` must not block the submitter beyond enqueueing. The decision
/// lock is released before `submit` is called, but the caller of `emit` is
/// still waiting on the call to return (and, for sync emitters, on the
/// reply channel), so a slow `submit` directly adds to emission latency.
pub trait Executor: Send + Sync {
    /// Schedules `task` to run on some worker thread. Fire-and-forget: the
    /// caller does not learn when the task completes.
    fn submit(&self, task: Box<dyn FnOnce() + Send + 'static>) -> Result<(), Error>;

    /// Stops accepting new tasks. Queued and running tasks are unaffected.
    fn shutdown(&self);

    /// Stops accepting new tasks and discards anything still queued.
    /// Tasks already running are left to finish. The default implementation
    /// is just `shutdown`, for executors with no queue to drain.
    fn shutdown_now(&self) {
        self.shutdown()
    }
}

/// Configuration for [`RayonExecutor`], in the builder-with-defaults shape
/// used elsewhere in this crate for runtime configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// `None` uses one worker per available hardware thread.
    pub worker_threads: Option<usize>,
    pub thread_name_prefix: &'static str,
}

impl ExecutorConfig {
    pub const DEFAULT: Self = ExecutorConfig {
        worker_threads: None,
        thread_name_prefix: "joincalc-worker",
    };

    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = Some(n);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: &'static str) -> Self {
        self.thread_name_prefix = prefix;
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The default executor: a dedicated `rayon` thread pool.
pub struct RayonExecutor {
    pool: rayon::ThreadPool,
    shut_down: AtomicBool,
}

impl RayonExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let prefix = config.thread_name_prefix;
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(move |i| format!("{prefix}-{i}"));
        if let Some(n) = config.worker_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .expect("building the join-calculus thread pool failed");
        RayonExecutor {
            pool,
            shut_down: AtomicBool::new(false),
        }
    }
}

impl Default for RayonExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::DEFAULT)
    }
}

impl Executor for RayonExecutor {
    fn submit(&self, task: Box<dyn FnOnce() + Send + 'static>) -> Result<(), Error> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::ExecutorRejected);
        }
        self.pool.spawn(task);
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }
}
