//! Error types for ospf-spider
//!
//! This module defines the error hierarchy that covers:
//! - Router management protocol (device session) errors
//! - Per-router crawl failures (unreachable, auth exhausted, unknown version)
//! - SQLite storage errors
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Per-router failures are expected outcomes of a crawl. They are carried as
//! values in the worker report and never abort the orchestrator loop. Only
//! storage errors stop persistence for the run.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the ospf-spider application
#[derive(Error, Debug)]
pub enum SpiderError {
    /// Router management protocol errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the router management capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// TCP connection could not be established
    #[error("Failed to connect to {address}:{port}: {reason}")]
    ConnectFailed {
        address: Ipv4Addr,
        port: u16,
        reason: String,
    },

    /// Router rejected the login
    #[error("Login rejected by {address}: {message}")]
    LoginRejected { address: Ipv4Addr, message: String },

    /// Router answered a command with a trap
    #[error("Command '{command}' failed: {message}")]
    Trap { command: String, message: String },

    /// Router closed the session with a fatal reply
    #[error("Session terminated by router: {0}")]
    Fatal(String),

    /// Reply could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport failure (timeout, reset, ...)
    #[error("I/O error: {0}")]
    Io(String),

    /// Session used after close or after a fatal error
    #[error("Session is closed")]
    Closed,
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        DeviceError::Io(e.to_string())
    }
}

/// Why a router contributed nothing to this run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Router did not answer the echo probe
    #[error("Router {address} is unreachable")]
    Unreachable { address: Ipv4Addr },

    /// No candidate password produced a live session
    #[error("Authentication failed on {address} after {attempts} candidate(s)")]
    AuthExhausted { address: Ipv4Addr, attempts: usize },

    /// Device software version is not one the collector understands
    #[error("Unsupported software version on {address}: {version}")]
    VersionUnknown { address: Ipv4Addr, version: String },

    /// Stop signal arrived before the worker started new work
    #[error("Crawl of {address} cancelled")]
    Cancelled { address: Ipv4Addr },
}

impl RouterError {
    /// Address of the router this failure belongs to
    pub fn address(&self) -> Ipv4Addr {
        match self {
            RouterError::Unreachable { address }
            | RouterError::AuthExhausted { address, .. }
            | RouterError::VersionUnknown { address, .. }
            | RouterError::Cancelled { address } => *address,
        }
    }

    /// Short label used in logs and run statistics
    pub fn kind(&self) -> &'static str {
        match self {
            RouterError::Unreachable { .. } => "unreachable",
            RouterError::AuthExhausted { .. } => "auth_exhausted",
            RouterError::VersionUnknown { .. } => "version_unknown",
            RouterError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No storage connection parameters were supplied
    #[error("Storage is not configured: no database path given")]
    NotConfigured,

    /// Database could not be opened or initialized
    #[error("Failed to open database at '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Writer thread died
    #[error("Database writer thread panicked")]
    WriterPanicked,

    /// Writer channel closed unexpectedly
    #[error("Database writer channel closed unexpectedly")]
    ChannelClosed,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Seed address missing
    #[error("No seed router given (use --seed or SPIDER_SEED)")]
    MissingSeed,

    /// Invalid worker count
    #[error("Invalid concurrency {count}: must be between 1 and {max}")]
    InvalidConcurrency { count: usize, max: usize },

    /// Password candidate list is empty
    #[error("No router passwords configured (use --password or SPIDER_PASSWORDS)")]
    NoPasswords,

    /// A timeout or interval was zero
    #[error("Invalid {name}: must be greater than zero")]
    InvalidTimeout { name: &'static str },

    /// No echo tool found on this host
    #[error("No usable echo tool found (tried: {tried})")]
    ProbeUnavailable { tried: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker thread could not be spawned
    #[error("Failed to spawn worker for {address}: {reason}")]
    SpawnFailed { address: Ipv4Addr, reason: String },

    /// Worker panicked
    #[error("Worker for {address} panicked")]
    Panicked { address: Ipv4Addr },
}

/// Result type alias for SpiderError
pub type Result<T> = std::result::Result<T, SpiderError>;

/// Result type alias for DeviceError
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;
