//! Topology storage in SQLite
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Crawl Orchestrator                      │
//! │  - Forwards each worker's DiscoveryRecord           │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ DiscoveryRecord
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            PersistenceWriter Thread                  │
//! │  - One connection for the run                       │
//! │  - One transaction per record                       │
//! │  - Drains the queue before stopping                 │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ upserts stamped with run timestamp
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │  routers / connections / interfaces / customers      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod schema;
pub mod store;
pub mod writer;

pub use schema::{create_database, keys};
pub use store::{adjacent_routers, load_segments, persist_record, SegmentRow};
pub use writer::{PersistenceWriter, WriterHandle, WriterOptions, WriterStats, WriterSummary};
