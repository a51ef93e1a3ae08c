//! Crawl subsystem
//!
//! Leaves first:
//! - `auth`: credential rotation, session guard
//! - `collector`: version detection and element tree collection
//! - `resolver`: neighbor to interface/VLAN/network mapping
//! - `worker`: per-router state machine on its own thread
//! - `orchestrator`: BFS frontier, concurrency cap, stop flag
//! - `record`: the per-router result handed to persistence

pub mod auth;
pub mod collector;
pub mod orchestrator;
pub mod record;
pub mod resolver;
pub mod worker;

pub use auth::{Authenticator, SessionGuard};
pub use collector::{collect, detect_version, RawTopology, VersionTag};
pub use orchestrator::{CrawlCoordinator, CrawlProgress, CrawlResult, Frontier};
pub use record::{CustomerSession, DiscoveryRecord, ResolvedNeighbor};
pub use resolver::resolve_neighbors;
pub use worker::{
    crawl_router, RouterWorker, WorkerContext, WorkerOutcome, WorkerReport, WorkerState,
};
