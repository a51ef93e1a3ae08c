//! Database schema definitions and creation
//!
//! Normalized topology snapshot. Routers and customer addresses are stored as
//! 32-bit integers, networks as CIDR text. Two routers on the same segment
//! are linked only through `connections` rows with an equal `network`.

use crate::error::DbResult;
use rusqlite::Connection;

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

const CREATE_ROUTERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS routers (
    id INTEGER PRIMARY KEY,
    address INTEGER NOT NULL UNIQUE,   -- IPv4 as u32
    last_seen INTEGER NOT NULL         -- Unix timestamp of the run
)
"#;

/// One shared segment a router terminates. NULL vlan_id means untagged.
const CREATE_CONNECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY,
    router_id INTEGER NOT NULL,
    vlan_id INTEGER,
    network TEXT NOT NULL,             -- CIDR, e.g. 10.0.68.224/30
    last_seen INTEGER NOT NULL,

    FOREIGN KEY (router_id) REFERENCES routers(id)
)
"#;

const CREATE_INTERFACE_NAMES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS interface_names (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
)
"#;

const CREATE_INTERFACES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS interfaces (
    id INTEGER PRIMARY KEY,
    connection_id INTEGER NOT NULL,
    name_id INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,

    UNIQUE (connection_id, name_id),
    FOREIGN KEY (connection_id) REFERENCES connections(id),
    FOREIGN KEY (name_id) REFERENCES interface_names(id)
)
"#;

const CREATE_CUSTOMERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    router_id INTEGER NOT NULL,
    address INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,

    FOREIGN KEY (router_id) REFERENCES routers(id)
)
"#;

/// One row per crawl invocation
const CREATE_CRAWL_RUNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY,
    started_at INTEGER NOT NULL,
    finished_at INTEGER,
    status TEXT NOT NULL,              -- running, completed, interrupted
    records_written INTEGER DEFAULT 0,
    routers INTEGER DEFAULT 0,
    connections INTEGER DEFAULT 0,
    customers INTEGER DEFAULT 0
)
"#;

const CREATE_SPIDER_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS spider_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// COALESCE lets untagged segments share the uniqueness rule
const CREATE_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_key
     ON connections(router_id, COALESCE(vlan_id, -1), network)",
    "CREATE INDEX IF NOT EXISTS idx_connections_network ON connections(network)",
    "CREATE INDEX IF NOT EXISTS idx_customers_router ON customers(router_id)",
];

/// Durable per-record commits; WAL keeps readers unblocked during a crawl
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA temp_store = MEMORY;
"#;

/// Create tables and indexes if missing
pub fn create_database(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;

    conn.execute(CREATE_ROUTERS_TABLE, [])?;
    conn.execute(CREATE_CONNECTIONS_TABLE, [])?;
    conn.execute(CREATE_INTERFACE_NAMES_TABLE, [])?;
    conn.execute(CREATE_INTERFACES_TABLE, [])?;
    conn.execute(CREATE_CUSTOMERS_TABLE, [])?;
    conn.execute(CREATE_CRAWL_RUNS_TABLE, [])?;
    conn.execute(CREATE_SPIDER_INFO_TABLE, [])?;

    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }

    Ok(())
}

/// Store spider metadata
pub fn set_spider_info(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO spider_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get spider metadata
pub fn get_spider_info(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM spider_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Metadata keys stored in `spider_info`
pub mod keys {
    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Spider version that last wrote the database
    pub const SPIDER_VERSION: &str = "spider_version";

    /// Seed router of the last run
    pub const SEED: &str = "seed";

    /// Last run status: "running", "completed", "interrupted"
    pub const STATUS: &str = "status";
}
