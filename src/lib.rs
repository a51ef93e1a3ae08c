//! ospf-spider - OSPF Topology Crawler for RouterOS Fleets
//!
//! Discovers the topology of an ISP router fleet by walking OSPF adjacencies
//! outward from a seed router. Every reachable router is queried over the
//! RouterOS API for its interfaces, VLANs, addresses, OSPF neighbors and
//! active PPP sessions, and the result is stored as a normalized snapshot in
//! SQLite.
//!
//! # Features
//!
//! - **Bounded Concurrency**: One worker thread per router in flight, capped
//!   at a fixed limit, each owning its own API session.
//!
//! - **Credential Rotation**: Candidate passwords are tried in order; the
//!   first live session wins.
//!
//! - **Version Dispatch**: RouterOS 6 and 7 are collected with their own
//!   property lists, selected once per router.
//!
//! - **VLAN Unwinding**: Each neighbor is mapped to the base interface and
//!   VLAN tag that carry it.
//!
//! - **Single Writer**: All database writes go through one thread, one
//!   transaction per router.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Crawl Orchestrator                          │
//! │   Frontier (seen + pending)  ──►  running workers (≤ cap)       │
//! │          ▲                                  │                    │
//! │          └──── new neighbor router ids ◄────┤                    │
//! └─────────────────────────────────────────────┼───────────────────┘
//!                                               │ spawn / join
//!                                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Router Workers                             │
//! │  probe ─► authenticate ─► detect version ─► collect ─► resolve   │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ DiscoveryRecord
//!                               ▼
//!            ┌──────────────────────────┐
//!            │   Persistence Writer     │
//!            │  (crossbeam channel)     │
//!            │  - one tx per record     │
//!            └────────────┬─────────────┘
//!                         ▼
//!              ┌──────────────────┐
//!              │   SQLite DB      │
//!              │  (topology.db)   │
//!              └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Crawl from a seed with two candidate passwords
//! ospf-spider --seed 10.1.0.1 --password first --password second --database topology.db
//!
//! # Which routers share a segment?
//! sqlite3 topology.db "SELECT network, COUNT(*) FROM connections
//!     GROUP BY network HAVING COUNT(*) > 1"
//! ```

pub mod config;
pub mod crawl;
pub mod db;
pub mod device;
pub mod error;
pub mod probe;
pub mod progress;

pub use config::{CliArgs, CrawlConfig};
pub use crawl::{CrawlCoordinator, CrawlResult};
pub use error::{Result, SpiderError};
