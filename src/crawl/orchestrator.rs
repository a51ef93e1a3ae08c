//! Crawl orchestrator - breadth-first traversal of the router fleet
//!
//! The orchestrator is responsible for:
//! - Owning the BFS frontier and the dedup guard
//! - Starting router workers under the concurrency cap
//! - Harvesting finished workers and queuing newly seen neighbors
//! - Forwarding discovery records to the persistence writer
//! - Honoring the stop flag and draining in-flight workers
//!
//! ```text
//!        ┌──────────── Frontier (seen + pending) ◄────────────┐
//!        │ pop                                                │ new neighbors
//!        ▼                                                    │
//!   spawn RouterWorker ──► running (≤ concurrency) ──► harvest┘
//!                                                        │ DiscoveryRecord
//!                                                        ▼
//!                                              PersistenceWriter
//! ```
//!
//! The loop runs on one thread and polls for finished workers. Only this
//! thread touches the frontier, so check-and-insert on the dedup guard is
//! atomic with respect to worker completion.

use crate::config::CrawlConfig;
use crate::crawl::auth::Authenticator;
use crate::crawl::worker::{RouterWorker, WorkerContext, WorkerOutcome};
use crate::db::writer::{
    PersistenceWriter, WriterHandle, WriterOptions, WriterSummary, DEFAULT_CHANNEL_SIZE,
};
use crate::device::Connector;
use crate::error::Result;
use crate::probe::Prober;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Failure label for workers that panicked
const KIND_PANICKED: &str = "panicked";

/// Failure label for workers that could not be spawned
const KIND_SPAWN_FAILED: &str = "spawn_failed";

/// Addresses ever scheduled plus those waiting to start
#[derive(Debug, Default)]
pub struct Frontier {
    seen: HashSet<Ipv4Addr>,
    pending: VecDeque<Ipv4Addr>,
}

impl Frontier {
    /// Frontier holding only the seed
    pub fn new(seed: Ipv4Addr) -> Self {
        let mut frontier = Self::default();
        frontier.offer(seed);
        frontier
    }

    /// Queue an address unless it was ever queued before
    pub fn offer(&mut self, address: Ipv4Addr) -> bool {
        if self.seen.insert(address) {
            self.pending.push_back(address);
            true
        } else {
            false
        }
    }

    pub fn pop(&mut self) -> Option<Ipv4Addr> {
        self.pending.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn seen(&self) -> usize {
        self.seen.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct CrawlProgress {
    /// Routers collected successfully
    pub visited: u64,
    /// Routers dropped (any failure kind)
    pub failed: u64,
    /// Addresses ever queued
    pub discovered: usize,
    pub running: usize,
    pub pending: usize,
    pub concurrency: usize,
    pub elapsed: Duration,
}

impl CrawlProgress {
    pub fn routers_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.visited + self.failed) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Result of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Routers collected successfully
    pub visited: u64,

    /// Dropped routers by failure kind
    pub failed: BTreeMap<&'static str, u64>,

    /// Addresses ever queued (including the seed)
    pub discovered: usize,

    /// Every address a worker was started for, in start order
    pub scheduled: Vec<Ipv4Addr>,

    /// Persistence writer counters
    pub writer: WriterSummary,

    pub duration: Duration,

    /// False if the stop flag ended the crawl
    pub completed: bool,

    /// True if the completed-worker limit ended the crawl
    pub limit_reached: bool,
}

impl CrawlResult {
    pub fn failed_total(&self) -> u64 {
        self.failed.values().sum()
    }

    /// Whether anything could be stored this run
    pub fn persisted(&self) -> bool {
        self.writer.persisted
    }
}

/// Counters shared with the progress thread
#[derive(Debug, Default)]
struct CrawlCounters {
    visited: AtomicU64,
    failed: AtomicU64,
    discovered: AtomicUsize,
    running: AtomicUsize,
    pending: AtomicUsize,
}

/// Per-run bookkeeping owned by the control loop
#[derive(Default)]
struct Tally {
    visited: u64,
    failed: BTreeMap<&'static str, u64>,
    scheduled: Vec<Ipv4Addr>,
}

impl Tally {
    fn fail(&mut self, kind: &'static str) {
        *self.failed.entry(kind).or_insert(0) += 1;
    }

    /// Workers that reached a final state, whatever the outcome
    fn completed(&self) -> u64 {
        self.visited + self.failed.values().sum::<u64>()
    }
}

/// Coordinates the crawl
pub struct CrawlCoordinator {
    config: Arc<CrawlConfig>,
    connector: Arc<dyn Connector>,
    prober: Arc<dyn Prober>,
    shutdown: Arc<AtomicBool>,
    counters: Arc<CrawlCounters>,
}

impl CrawlCoordinator {
    pub fn new(
        config: CrawlConfig,
        connector: Arc<dyn Connector>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            prober,
            shutdown: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(CrawlCounters::default()),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn progress(&self, elapsed: Duration) -> CrawlProgress {
        snapshot(&self.counters, self.config.concurrency, elapsed)
    }

    /// Run the crawl to completion, interruption, or the router limit
    pub fn run(&self) -> Result<CrawlResult> {
        let start = Instant::now();
        let run_ts = Utc::now().timestamp();
        let config = &self.config;

        info!(
            seed = %config.seed,
            concurrency = config.concurrency,
            candidates = config.passwords.len(),
            "Starting crawl"
        );

        let writer = PersistenceWriter::start(WriterOptions {
            db_path: config.database.clone(),
            run_ts,
            seed: config.seed,
            channel_size: DEFAULT_CHANNEL_SIZE,
        })?;
        let sink = writer.handle();

        let ctx = WorkerContext {
            prober: Arc::clone(&self.prober),
            authenticator: Authenticator::new(
                Arc::clone(&self.connector),
                config.login.clone(),
                config.api_port,
            ),
            passwords: Arc::new(config.passwords.clone()),
            shutdown: Arc::clone(&self.shutdown),
        };

        let mut frontier = Frontier::new(config.seed);
        let mut running: Vec<RouterWorker> = Vec::with_capacity(config.concurrency);
        let mut tally = Tally::default();
        let mut interrupted = false;
        let mut limit_reached = false;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!(
                    running = running.len(),
                    pending = frontier.pending(),
                    "Shutdown signal received"
                );
                interrupted = true;
                break;
            }

            // Admit new workers
            while running.len() < config.concurrency {
                let Some(address) = frontier.pop() else {
                    break;
                };
                match RouterWorker::spawn(address, ctx.clone()) {
                    Ok(worker) => {
                        debug!(router = %address, "Worker started");
                        tally.scheduled.push(address);
                        running.push(worker);
                    }
                    Err(e) => {
                        warn!(router = %address, error = %e, "Failed to start worker");
                        tally.scheduled.push(address);
                        tally.fail(KIND_SPAWN_FAILED);
                    }
                }
            }

            // Harvest finished workers
            let mut i = 0;
            while i < running.len() {
                if running[i].is_finished() {
                    let worker = running.swap_remove(i);
                    harvest(worker, Some(&mut frontier), &sink, &mut tally);
                } else {
                    i += 1;
                }
            }

            self.publish(&frontier, running.len(), &tally);

            if running.is_empty() && frontier.is_exhausted() {
                break;
            }

            if self.at_router_limit(tally.completed()) {
                info!(
                    completed = tally.completed(),
                    running = running.len(),
                    pending = frontier.pending(),
                    "Router limit reached"
                );
                limit_reached = true;
                break;
            }

            thread::sleep(config.poll_interval);
        }

        // Drain workers already in flight; their neighbors are not expanded
        for worker in running.drain(..) {
            harvest(worker, None, &sink, &mut tally);
        }
        self.publish(&frontier, 0, &tally);

        drop(sink);
        let writer_summary = writer.finish(interrupted)?;

        let result = CrawlResult {
            visited: tally.visited,
            failed: tally.failed,
            discovered: frontier.seen(),
            scheduled: tally.scheduled,
            writer: writer_summary,
            duration: start.elapsed(),
            completed: !interrupted,
            limit_reached,
        };

        info!(
            visited = result.visited,
            failed = result.failed_total(),
            discovered = result.discovered,
            persisted = result.writer.records_written,
            duration_secs = result.duration.as_secs(),
            "Crawl finished"
        );

        Ok(result)
    }

    /// Run with a callback fed from a progress thread every 100ms
    pub fn run_with_progress<F>(&self, progress_callback: F) -> Result<CrawlResult>
    where
        F: Fn(CrawlProgress) + Send + 'static,
    {
        let start = Instant::now();
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = Arc::clone(&done);
        let counters = Arc::clone(&self.counters);
        let concurrency = self.config.concurrency;

        let progress_handle = thread::spawn(move || {
            while !done_flag.load(Ordering::Relaxed) {
                progress_callback(snapshot(&counters, concurrency, start.elapsed()));
                thread::sleep(Duration::from_millis(100));
            }
        });

        let result = self.run();

        done.store(true, Ordering::SeqCst);
        let _ = progress_handle.join();

        result
    }

    fn at_router_limit(&self, completed: u64) -> bool {
        self.config
            .max_routers
            .is_some_and(|max| completed >= max as u64)
    }

    fn publish(&self, frontier: &Frontier, running: usize, tally: &Tally) {
        let c = &self.counters;
        c.visited.store(tally.visited, Ordering::Relaxed);
        c.failed.store(tally.failed.values().sum(), Ordering::Relaxed);
        c.discovered.store(frontier.seen(), Ordering::Relaxed);
        c.running.store(running, Ordering::Relaxed);
        c.pending.store(frontier.pending(), Ordering::Relaxed);
    }
}

fn snapshot(c: &CrawlCounters, concurrency: usize, elapsed: Duration) -> CrawlProgress {
    CrawlProgress {
        visited: c.visited.load(Ordering::Relaxed),
        failed: c.failed.load(Ordering::Relaxed),
        discovered: c.discovered.load(Ordering::Relaxed),
        running: c.running.load(Ordering::Relaxed),
        pending: c.pending.load(Ordering::Relaxed),
        concurrency,
        elapsed,
    }
}

/// Join one finished worker and route its output
fn harvest(
    worker: RouterWorker,
    frontier: Option<&mut Frontier>,
    sink: &WriterHandle,
    tally: &mut Tally,
) {
    let address = worker.address();

    let report = match worker.join() {
        Ok(report) => report,
        Err(e) => {
            warn!(router = %address, error = %e, "Worker did not finish cleanly");
            tally.fail(KIND_PANICKED);
            return;
        }
    };

    let record = match report.outcome {
        WorkerOutcome::Discovered(record) => record,
        WorkerOutcome::Failed(e) => {
            tally.fail(e.kind());
            return;
        }
    };

    tally.visited += 1;

    if let Some(frontier) = frontier {
        for neighbor in record.neighbor_addresses() {
            if frontier.offer(neighbor) {
                debug!(router = %address, neighbor = %neighbor, "Neighbor queued");
            }
        }
    }

    if let Err(e) = sink.send(record) {
        warn!(router = %address, error = %e, "Failed to queue discovery record");
    }
}
