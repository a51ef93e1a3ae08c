//! Single-writer persistence queue
//!
//! Runs in a dedicated thread and receives discovery records via a channel.
//! Any number of producers may hold a [`WriterHandle`]; only the writer
//! thread touches the database.
//!
//! - One connection for the whole run, opened by the writer thread
//! - One `crawl_runs` marker row stamped with the run timestamp
//! - One transaction per record, committed immediately
//! - On stop, the queue is drained completely before the thread exits
//!
//! If storage is unavailable the thread logs a critical error and keeps
//! draining the queue, counting every record as dropped.

use crate::crawl::record::DiscoveryRecord;
use crate::db::schema::{self, keys};
use crate::db::store::{self, RunTotals};
use crate::error::{DbError, DbResult};
use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use rusqlite::Connection;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Queue capacity before producers block
pub const DEFAULT_CHANNEL_SIZE: usize = 256;

/// Sleep between polls of an empty queue
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Live counters, readable while the writer runs
#[derive(Debug, Default)]
pub struct WriterStats {
    pub records_written: AtomicU64,
    pub records_dropped: AtomicU64,
    pub partial_records: AtomicU64,
    pub routers: AtomicU64,
    pub connections: AtomicU64,
    pub interfaces: AtomicU64,
    pub customers: AtomicU64,
}

impl WriterStats {
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    fn snapshot(&self, persisted: bool) -> WriterSummary {
        WriterSummary {
            records_written: self.records_written(),
            records_dropped: self.records_dropped(),
            partial_records: self.partial_records.load(Ordering::Relaxed),
            routers: self.routers.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            interfaces: self.interfaces.load(Ordering::Relaxed),
            customers: self.customers.load(Ordering::Relaxed),
            persisted,
        }
    }
}

/// Final writer counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterSummary {
    pub records_written: u64,
    pub records_dropped: u64,
    /// Written records that lost at least one table fetch
    pub partial_records: u64,
    pub routers: u64,
    pub connections: u64,
    pub interfaces: u64,
    pub customers: u64,
    /// False if storage was unavailable for the run
    pub persisted: bool,
}

/// Handle for sending records to the writer
#[derive(Clone)]
pub struct WriterHandle {
    sender: Sender<DiscoveryRecord>,
}

impl WriterHandle {
    /// Queue a record for persistence
    pub fn send(&self, record: DiscoveryRecord) -> DbResult<()> {
        self.sender.send(record).map_err(|_| DbError::ChannelClosed)
    }
}

/// Where and how the writer stores one run
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// SQLite file; `None` means storage is not configured
    pub db_path: Option<PathBuf>,

    /// Timestamp shared by every row written this run
    pub run_ts: i64,

    /// Seed router, recorded in metadata
    pub seed: Ipv4Addr,

    pub channel_size: usize,
}

/// Persistence writer that runs in its own thread
pub struct PersistenceWriter {
    handle: Option<JoinHandle<WriterSummary>>,
    writer_handle: WriterHandle,
    stop: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
}

impl PersistenceWriter {
    /// Spawn the writer thread
    ///
    /// Storage is validated and opened inside the thread; only a failure to
    /// spawn is returned here.
    pub fn start(options: WriterOptions) -> DbResult<Self> {
        let (sender, receiver) = bounded(options.channel_size.max(1));
        let stats = Arc::new(WriterStats::default());
        let stop = Arc::new(AtomicBool::new(false));
        let interrupted = Arc::new(AtomicBool::new(false));

        let writer_handle = WriterHandle { sender };

        let thread_stop = Arc::clone(&stop);
        let thread_interrupted = Arc::clone(&interrupted);
        let spawn_path = options.db_path.clone().unwrap_or_default();

        let handle = thread::Builder::new()
            .name("db-writer".into())
            .spawn(move || {
                writer_thread(options, receiver, stats, thread_stop, thread_interrupted)
            })
            .map_err(|e| DbError::OpenFailed {
                path: spawn_path,
                reason: format!("Failed to spawn writer thread: {}", e),
            })?;

        Ok(Self {
            handle: Some(handle),
            writer_handle,
            stop,
            interrupted,
        })
    }

    /// Get a handle for sending records to the writer
    pub fn handle(&self) -> WriterHandle {
        self.writer_handle.clone()
    }

    /// Signal drain-and-stop and wait for the thread
    pub fn finish(mut self, interrupted: bool) -> DbResult<WriterSummary> {
        self.interrupted.store(interrupted, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);

        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| DbError::WriterPanicked),
            None => Err(DbError::WriterPanicked),
        }
    }
}

/// Validate and open the run's database
fn open_storage(path: Option<&Path>) -> DbResult<Connection> {
    let path = path.ok_or(DbError::NotConfigured)?;

    let conn = Connection::open(path).map_err(|e| DbError::OpenFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    schema::create_database(&conn).map_err(|e| DbError::OpenFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(conn)
}

/// Internal writer thread function
fn writer_thread(
    options: WriterOptions,
    receiver: Receiver<DiscoveryRecord>,
    stats: Arc<WriterStats>,
    stop: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
) -> WriterSummary {
    let session = open_storage(options.db_path.as_deref()).and_then(|conn| {
        let run_id = start_run(&conn, &options)?;
        Ok((conn, run_id))
    });

    let (conn, run_id) = match session {
        Ok(session) => session,
        Err(e) => {
            error!(
                severity = "critical",
                error = %e,
                "Storage unavailable, discovered topology will not be persisted"
            );
            discard_loop(&receiver, &stats, &stop);
            let summary = stats.snapshot(false);
            warn!(dropped = summary.records_dropped, "Writer discarded all records");
            return summary;
        }
    };

    info!(run_ts = options.run_ts, run_id, "Persistence writer started");

    loop {
        match receiver.try_recv() {
            Ok(record) => write_record(&conn, &record, options.run_ts, &stats),
            Err(TryRecvError::Empty) => {
                if stop.load(Ordering::SeqCst) && receiver.is_empty() {
                    break;
                }
                thread::sleep(IDLE_WAIT);
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }

    let summary = stats.snapshot(true);
    let status = if interrupted.load(Ordering::SeqCst) {
        "interrupted"
    } else {
        "completed"
    };
    if let Err(e) = close_run(&conn, run_id, status, &summary) {
        warn!(error = %e, "Failed to finalize run marker");
    }

    info!(
        records = summary.records_written,
        partial = summary.partial_records,
        routers = summary.routers,
        connections = summary.connections,
        interfaces = summary.interfaces,
        customers = summary.customers,
        "Persistence writer finished"
    );

    summary
}

fn start_run(conn: &Connection, options: &WriterOptions) -> DbResult<i64> {
    schema::set_spider_info(conn, keys::SCHEMA_VERSION, &schema::SCHEMA_VERSION.to_string())?;
    schema::set_spider_info(conn, keys::SPIDER_VERSION, env!("CARGO_PKG_VERSION"))?;
    schema::set_spider_info(conn, keys::SEED, &options.seed.to_string())?;
    schema::set_spider_info(conn, keys::STATUS, "running")?;
    store::begin_run(conn, options.run_ts)
}

fn close_run(
    conn: &Connection,
    run_id: i64,
    status: &str,
    summary: &WriterSummary,
) -> DbResult<()> {
    let totals = RunTotals {
        records_written: summary.records_written,
        routers: summary.routers,
        connections: summary.connections,
        customers: summary.customers,
    };
    store::finish_run(conn, run_id, Utc::now().timestamp(), status, &totals)?;
    schema::set_spider_info(conn, keys::STATUS, status)
}

/// Persist one record; a failure loses only this record
fn write_record(conn: &Connection, record: &DiscoveryRecord, run_ts: i64, stats: &WriterStats) {
    match store::persist_record(conn, record, run_ts) {
        Ok(counts) => {
            stats.records_written.fetch_add(1, Ordering::Relaxed);
            if record.is_partial() {
                stats.partial_records.fetch_add(1, Ordering::Relaxed);
            }
            stats.routers.fetch_add(1, Ordering::Relaxed);
            stats.connections.fetch_add(counts.connections, Ordering::Relaxed);
            stats.interfaces.fetch_add(counts.interfaces, Ordering::Relaxed);
            stats.customers.fetch_add(counts.customers, Ordering::Relaxed);
            debug!(
                router = %record.router,
                connections = counts.connections,
                "Record persisted"
            );
        }
        Err(e) => {
            stats.records_dropped.fetch_add(1, Ordering::Relaxed);
            error!(router = %record.router, error = %e, "Failed to persist record");
        }
    }
}

/// Keep producers unblocked when there is nowhere to write
fn discard_loop(receiver: &Receiver<DiscoveryRecord>, stats: &WriterStats, stop: &AtomicBool) {
    loop {
        match receiver.try_recv() {
            Ok(_) => {
                stats.records_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TryRecvError::Empty) => {
                if stop.load(Ordering::SeqCst) && receiver.is_empty() {
                    break;
                }
                thread::sleep(IDLE_WAIT);
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }
}
