//! Configuration types for ospf-spider
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::device::routeros::DEFAULT_API_PORT;
use crate::error::ConfigError;
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum routers crawled at once
pub const MAX_CONCURRENCY: usize = 64;

/// Default routers crawled at once
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default orchestrator poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// OSPF topology crawler for RouterOS fleets
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ospf-spider",
    version,
    about = "OSPF topology crawler for RouterOS fleets",
    long_about = "Walks OSPF adjacencies outward from a seed router, collecting interface, VLAN,\n\
                  address and PPP session data from every reachable router over the RouterOS API,\n\
                  and stores a normalized topology snapshot in SQLite.",
    after_help = "EXAMPLES:\n    \
        ospf-spider --seed 10.1.0.1 --password first --password second --database topology.db\n    \
        SPIDER_PASSWORDS=first,second ospf-spider --seed 10.1.0.1 --database topology.db -c 10\n    \
        ospf-spider --seed 10.1.0.1 --password secret --database t.db --max-routers 3 -v"
)]
pub struct CliArgs {
    /// Router to start the crawl from
    #[arg(long, env = "SPIDER_SEED", value_name = "IPV4")]
    pub seed: Option<Ipv4Addr>,

    /// Candidate API password, tried in order (can be repeated)
    #[arg(
        long = "password",
        env = "SPIDER_PASSWORDS",
        value_name = "PASSWORD",
        value_delimiter = ',',
        action = clap::ArgAction::Append,
        hide_env_values = true
    )]
    pub passwords: Vec<String>,

    /// API login name
    #[arg(long, default_value = "admin", value_name = "NAME")]
    pub login: String,

    /// RouterOS API port
    #[arg(long, default_value_t = DEFAULT_API_PORT, value_name = "PORT")]
    pub api_port: u16,

    /// SQLite database for the topology snapshot
    #[arg(long, env = "SPIDER_DATABASE", value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Routers crawled concurrently
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, value_name = "NUM")]
    pub concurrency: usize,

    /// Echo probe timeout in seconds
    #[arg(long, default_value = "1", value_name = "SECS")]
    pub probe_timeout: u64,

    /// API connect/read timeout in seconds
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub api_timeout: u64,

    /// Stop after this many routers have finished (debug runs)
    #[arg(long, value_name = "NUM")]
    pub max_routers: Option<usize>,

    /// Orchestrator poll interval in milliseconds
    #[arg(long, default_value = "200", value_name = "MS")]
    pub poll_interval_ms: u64,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// First router to visit
    pub seed: Ipv4Addr,

    /// Candidate passwords in the order they are tried
    pub passwords: Vec<String>,

    /// API login name
    pub login: String,

    /// RouterOS API port
    pub api_port: u16,

    /// Topology database; `None` leaves the writer without storage
    pub database: Option<PathBuf>,

    /// Maximum routers in flight
    pub concurrency: usize,

    pub probe_timeout: Duration,

    pub api_timeout: Duration,

    /// Completed-worker limit
    pub max_routers: Option<usize>,

    pub poll_interval: Duration,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl CrawlConfig {
    /// Configuration with defaults for everything but seed and passwords
    pub fn new(seed: Ipv4Addr, passwords: Vec<String>) -> Self {
        Self {
            seed,
            passwords,
            login: "admin".to_string(),
            api_port: DEFAULT_API_PORT,
            database: None,
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: Duration::from_secs(1),
            api_timeout: Duration::from_secs(10),
            max_routers: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            show_progress: false,
            verbose: false,
        }
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let seed = args.seed.ok_or(ConfigError::MissingSeed)?;

        let passwords: Vec<String> = args
            .passwords
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        if passwords.is_empty() {
            return Err(ConfigError::NoPasswords);
        }

        if args.concurrency == 0 || args.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidConcurrency {
                count: args.concurrency,
                max: MAX_CONCURRENCY,
            });
        }

        if args.probe_timeout == 0 {
            return Err(ConfigError::InvalidTimeout { name: "probe timeout" });
        }
        if args.api_timeout == 0 {
            return Err(ConfigError::InvalidTimeout { name: "API timeout" });
        }
        if args.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout { name: "poll interval" });
        }

        Ok(Self {
            seed,
            passwords,
            login: args.login,
            api_port: args.api_port,
            database: args.database,
            concurrency: args.concurrency,
            probe_timeout: Duration::from_secs(args.probe_timeout),
            api_timeout: Duration::from_secs(args.api_timeout),
            max_routers: args.max_routers,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}
