//! Router worker
//!
//! One worker thread per router in flight. A worker:
//! - Probes the router for reachability
//! - Authenticates with the first working candidate password
//! - Detects the software version and collects element trees
//! - Resolves OSPF neighbors to local interfaces
//! - Returns a [`WorkerReport`] through its join handle
//!
//! Workers share no mutable state. The session is owned by a
//! [`SessionGuard`](crate::crawl::auth::SessionGuard) and closed on every
//! exit path. The stop flag is checked before authentication and before
//! collection; past the last check a worker runs to completion.

use crate::crawl::auth::Authenticator;
use crate::crawl::collector::{self, VersionTag};
use crate::crawl::record::{CustomerSession, DiscoveryRecord};
use crate::crawl::resolver;
use crate::error::{RouterError, WorkerError};
use crate::probe::Prober;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace};

/// Lifecycle of one router crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    ProbingReachability,
    Authenticating,
    DetectingVersion,
    Collecting,
    Resolving,
    Publishing,
    Done,
    Failed,
}

impl WorkerState {
    /// Done and Failed are absorbing
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Done | WorkerState::Failed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a worker produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Discovered(DiscoveryRecord),
    Failed(RouterError),
}

/// Final report handed back to the orchestrator
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub address: Ipv4Addr,

    /// Version detected, if the worker got that far
    pub version: Option<VersionTag>,

    pub outcome: WorkerOutcome,

    /// Last state reached (Done or Failed)
    pub final_state: WorkerState,
}

impl WorkerReport {
    pub fn record(&self) -> Option<&DiscoveryRecord> {
        match &self.outcome {
            WorkerOutcome::Discovered(record) => Some(record),
            WorkerOutcome::Failed(_) => None,
        }
    }
}

/// Shared, read-only inputs every worker needs
#[derive(Clone)]
pub struct WorkerContext {
    pub prober: Arc<dyn Prober>,
    pub authenticator: Authenticator,
    pub passwords: Arc<Vec<String>>,
    pub shutdown: Arc<AtomicBool>,
}

/// Handle to a running worker thread
pub struct RouterWorker {
    address: Ipv4Addr,
    handle: Option<JoinHandle<WorkerReport>>,
}

impl RouterWorker {
    /// Spawn a worker thread for one router
    pub fn spawn(address: Ipv4Addr, ctx: WorkerContext) -> Result<Self, WorkerError> {
        let handle = thread::Builder::new()
            .name(format!("router-{}", address))
            .spawn(move || crawl_router(address, &ctx))
            .map_err(|e| WorkerError::SpawnFailed {
                address,
                reason: e.to_string(),
            })?;

        Ok(Self {
            address,
            handle: Some(handle),
        })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Whether the thread has returned (join will not block)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker and take its report
    pub fn join(mut self) -> Result<WorkerReport, WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                address: self.address,
            }),
            None => Err(WorkerError::Panicked {
                address: self.address,
            }),
        }
    }
}

/// State tracker; logs every transition
struct Progress {
    address: Ipv4Addr,
    state: WorkerState,
    version: Option<VersionTag>,
}

impl Progress {
    fn advance(&mut self, next: WorkerState) {
        trace!(router = %self.address, from = %self.state, to = %next, "Worker transition");
        self.state = next;
    }

    fn fail(mut self, error: RouterError) -> WorkerReport {
        self.advance(WorkerState::Failed);
        match &error {
            RouterError::Unreachable { .. } | RouterError::Cancelled { .. } => {
                debug!(router = %self.address, reason = error.kind(), "Router dropped");
            }
            _ => {
                info!(router = %self.address, error = %error, "Router dropped");
            }
        }
        WorkerReport {
            address: self.address,
            version: self.version,
            outcome: WorkerOutcome::Failed(error),
            final_state: self.state,
        }
    }
}

/// Run the full crawl sequence for one router on the current thread
pub fn crawl_router(address: Ipv4Addr, ctx: &WorkerContext) -> WorkerReport {
    let mut progress = Progress {
        address,
        state: WorkerState::Created,
        version: None,
    };

    progress.advance(WorkerState::ProbingReachability);
    if !ctx.prober.is_alive(address) {
        return progress.fail(RouterError::Unreachable { address });
    }

    if ctx.shutdown.load(Ordering::Relaxed) {
        return progress.fail(RouterError::Cancelled { address });
    }

    progress.advance(WorkerState::Authenticating);
    let mut session = match ctx.authenticator.authenticate(address, &ctx.passwords) {
        Ok(session) => session,
        Err(e) => return progress.fail(e),
    };

    progress.advance(WorkerState::DetectingVersion);
    let tag = match collector::detect_version(&mut *session, address) {
        Ok(tag) => tag,
        Err(e) => return progress.fail(e),
    };
    progress.version = Some(tag);

    if ctx.shutdown.load(Ordering::Relaxed) {
        return progress.fail(RouterError::Cancelled { address });
    }

    progress.advance(WorkerState::Collecting);
    let topology = collector::collect(&mut *session, tag);
    drop(session);

    if !topology.failed_fetches.is_empty() {
        debug!(router = %address, failed = ?topology.failed_fetches, "Partial collection");
    }

    progress.advance(WorkerState::Resolving);
    let neighbors = resolver::resolve_neighbors(&topology);

    progress.advance(WorkerState::Publishing);
    let record = DiscoveryRecord {
        router: address,
        neighbors,
        customers: topology
            .sessions
            .into_iter()
            .map(|s| CustomerSession {
                name: s.name,
                address: s.address,
            })
            .collect(),
        failed_fetches: topology.failed_fetches,
    };

    debug!(
        router = %address,
        version = %tag,
        neighbors = record.neighbors.len(),
        customers = record.customers.len(),
        "Router collected"
    );

    progress.advance(WorkerState::Done);
    WorkerReport {
        address,
        version: Some(tag),
        outcome: WorkerOutcome::Discovered(record),
        final_state: progress.state,
    }
}
