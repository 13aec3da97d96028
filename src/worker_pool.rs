//! # Worker Pool Module
//!
//! Executors that run handler work off the caller's thread, and the policy that
//! picks one for a route.
//!
//! ## Pools
//!
//! [`CoroutinePool`] spawns N `may` worker coroutines sharing one unbounded
//! MPSC queue. Workers load-balance automatically; each job runs under panic
//! recovery so a crashing task never takes its worker down.
//!
//! ## Backpressure
//!
//! - `block`: every job is queued; `queue_bound` only feeds metrics
//! - `shed`: jobs beyond `queue_bound` are refused with
//!   [`DispatchError::PoolRejected`], which the dispatcher maps to 503
//!
//! ## Thread selection
//!
//! [`PoolExecutorSelector`] implements [`ExecutorSelector`]:
//!
//! | Policy | Pool |
//! |---|---|
//! | route names a pool (`execute_on`) | that pool, always |
//! | `manual` | none (run inline) |
//! | `io` | the io pool |
//! | `blocking` | the blocking pool |
//! | `auto` | the blocking pool for blocking, non-stream routes; otherwise inline |
//!
//! ## Configuration
//!
//! - `ROUTEFLOW_POOL_WORKERS`: worker coroutines per pool (default: 4)
//! - `ROUTEFLOW_POOL_QUEUE_BOUND`: queue depth limit (default: 1024)
//! - `ROUTEFLOW_BACKPRESSURE_MODE`: `block` or `shed` (default: `block`)
//! - `ROUTEFLOW_STACK_SIZE`: coroutine stack size, decimal or `0x` hex (default: 64KB)

use crate::error::{DispatchError, FlowResult};
use crate::flow::panic_message;
use crate::route::RouteInfo;
use may::sync::mpsc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A unit of work submitted to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An executor the dispatcher can shift handler work onto.
pub trait WorkerPool: Send + Sync {
    fn name(&self) -> &str;

    /// Queue `job`. An error means the job will never run.
    fn execute(&self, job: Job) -> FlowResult<()>;
}

/// Configuration for worker pool backpressure behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureMode {
    /// Queue every job
    #[default]
    Block,
    /// Refuse jobs once the queue is at its bound
    Shed,
}

impl BackpressureMode {
    /// Parse backpressure mode from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "block" => Some(Self::Block),
            "shed" => Some(Self::Shed),
            _ => None,
        }
    }
}

/// Configuration for a worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Maximum queue depth
    pub queue_bound: usize,
    pub backpressure_mode: BackpressureMode,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let num_workers = std::env::var("ROUTEFLOW_POOL_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.num_workers);

        let queue_bound = std::env::var("ROUTEFLOW_POOL_QUEUE_BOUND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.queue_bound);

        let backpressure_mode = std::env::var("ROUTEFLOW_BACKPRESSURE_MODE")
            .ok()
            .and_then(|s| BackpressureMode::parse(&s))
            .unwrap_or_default();

        let stack_size = std::env::var("ROUTEFLOW_STACK_SIZE")
            .ok()
            .and_then(|s| {
                if let Some(hex) = s.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).ok()
                } else {
                    s.parse().ok()
                }
            })
            .unwrap_or(defaults.stack_size);

        Self {
            num_workers,
            queue_bound,
            backpressure_mode,
            stack_size,
        }
    }

    #[must_use]
    pub fn new(
        num_workers: usize,
        queue_bound: usize,
        backpressure_mode: BackpressureMode,
        stack_size: usize,
    ) -> Self {
        Self {
            num_workers,
            queue_bound,
            backpressure_mode,
            stack_size,
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_bound: 1024,
            backpressure_mode: BackpressureMode::Block,
            stack_size: 0x10000, // 64KB
        }
    }
}

/// Metrics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    /// Jobs refused in shed mode
    pub shed_count: AtomicU64,
    /// Current queue depth (queued or running)
    pub queue_depth: AtomicUsize,
    pub dispatched_count: AtomicU64,
    pub completed_count: AtomicU64,
    /// Jobs that panicked
    pub panic_count: AtomicU64,
}

impl WorkerPoolMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_shed(&self) {
        self.shed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panic_count.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_shed_count(&self) -> u64 {
        self.shed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_panic_count(&self) -> u64 {
        self.panic_count.load(Ordering::Relaxed)
    }
}

/// A pool of `may` worker coroutines sharing one job queue
pub struct CoroutinePool {
    name: String,
    config: WorkerPoolConfig,
    sender: mpsc::Sender<Job>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl CoroutinePool {
    /// Create a pool and spawn its workers.
    ///
    /// # Safety
    ///
    /// This function is marked unsafe because it spawns coroutines using
    /// `may::coroutine::Builder::spawn()`, which is unsafe in the `may` runtime.
    /// The caller must ensure the May coroutine runtime is properly initialized.
    pub unsafe fn new(name: impl Into<String>, config: WorkerPoolConfig) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Job>();
        let metrics = Arc::new(WorkerPoolMetrics::new());

        // All workers share one receiver and load-balance across it
        let rx = Arc::new(rx);

        info!(
            pool = %name,
            num_workers = config.num_workers,
            queue_bound = config.queue_bound,
            backpressure_mode = ?config.backpressure_mode,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let pool_name = name.clone();
            let metrics = Arc::clone(&metrics);

            let spawn_result = may::coroutine::Builder::new()
                .stack_size(config.stack_size)
                .spawn(move || {
                    debug!(pool = %pool_name, worker_id, "Worker coroutine started");

                    // Runs until every sender is dropped
                    while let Ok(job) = rx.recv() {
                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                        {
                            metrics.record_panic();
                            error!(
                                pool = %pool_name,
                                worker_id,
                                panic_message = %panic_message(&*panic),
                                "Pool job panicked"
                            );
                        }
                        metrics.record_completion();
                    }

                    debug!(pool = %pool_name, worker_id, "Worker coroutine exiting");
                });

            if let Err(e) = spawn_result {
                error!(
                    pool = %name,
                    worker_id,
                    error = %e,
                    "Failed to spawn worker coroutine"
                );
            }
        }

        Self {
            name,
            config,
            sender: tx,
            metrics,
        }
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<WorkerPoolMetrics> {
        Arc::clone(&self.metrics)
    }

    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    fn rejected(&self, reason: &str) -> DispatchError {
        DispatchError::PoolRejected {
            pool: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl WorkerPool for CoroutinePool {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, job: Job) -> FlowResult<()> {
        if self.config.backpressure_mode == BackpressureMode::Shed
            && self.metrics.get_queue_depth() >= self.config.queue_bound
        {
            self.metrics.record_shed();
            warn!(
                pool = %self.name,
                queue_depth = self.metrics.get_queue_depth(),
                queue_bound = self.config.queue_bound,
                "Worker pool queue full, shedding job"
            );
            return Err(self.rejected("queue full"));
        }

        self.metrics.record_dispatch();
        if self.sender.send(job).is_err() {
            // Undo the dispatch so depth stays accurate
            self.metrics.queue_depth.fetch_sub(1, Ordering::Relaxed);
            error!(pool = %self.name, "Worker pool channel disconnected");
            return Err(self.rejected("workers are not running"));
        }
        Ok(())
    }
}

/// Global thread-selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadSelection {
    /// Offload blocking routes, run the rest inline
    Auto,
    /// Run every route on the io pool
    Io,
    /// Run every route on the blocking pool
    Blocking,
    /// Run inline unless a route names its pool
    #[default]
    Manual,
}

impl ThreadSelection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "io" => Some(Self::Io),
            "blocking" => Some(Self::Blocking),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Picks the executor a route runs on; `None` means run inline.
pub trait ExecutorSelector: Send + Sync {
    fn select(&self, route: &RouteInfo, policy: ThreadSelection) -> Option<Arc<dyn WorkerPool>>;
}

/// [`ExecutorSelector`] over a set of registered pools.
#[derive(Default, Clone)]
pub struct PoolExecutorSelector {
    named: HashMap<String, Arc<dyn WorkerPool>>,
    io: Option<Arc<dyn WorkerPool>>,
    blocking: Option<Arc<dyn WorkerPool>>,
}

impl PoolExecutorSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool routes can name through `execute_on`.
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.named.insert(pool.name().to_string(), pool);
        self
    }

    #[must_use]
    pub fn with_io_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.io = Some(pool);
        self
    }

    #[must_use]
    pub fn with_blocking_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.blocking = Some(pool);
        self
    }
}

impl ExecutorSelector for PoolExecutorSelector {
    fn select(&self, route: &RouteInfo, policy: ThreadSelection) -> Option<Arc<dyn WorkerPool>> {
        if let Some(name) = route.execute_on.as_deref() {
            let pool = self.named.get(name).cloned();
            if pool.is_none() {
                warn!(
                    handler_name = %route.handler_name,
                    pool = name,
                    "Route names an unknown worker pool, running inline"
                );
            }
            return pool;
        }

        match policy {
            ThreadSelection::Manual => None,
            ThreadSelection::Io => self.io.clone(),
            ThreadSelection::Blocking => self.blocking.clone(),
            ThreadSelection::Auto => {
                if route.blocking && !route.returns.is_async_or_reactive() {
                    self.blocking.clone()
                } else {
                    None
                }
            }
        }
    }
}
