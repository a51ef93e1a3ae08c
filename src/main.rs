//! ospf-spider - OSPF topology crawler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use ospf_spider::config::{CliArgs, CrawlConfig};
use ospf_spider::crawl::CrawlCoordinator;
use ospf_spider::device::ApiConnector;
use ospf_spider::probe::PingProber;
use ospf_spider::progress::{print_header, print_summary, ProgressReporter};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = CrawlConfig::from_args(args).context("Invalid configuration")?;

    let prober = PingProber::detect(config.probe_timeout).context("Invalid configuration")?;
    info!(tool = ?prober.tool(), "Reachability probe ready");

    if config.show_progress {
        print_header(&config);
    }

    let connector = ApiConnector::new(config.api_timeout);
    let coordinator = CrawlCoordinator::new(config.clone(), Arc::new(connector), Arc::new(prober));

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing routers in flight...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let result = if config.show_progress {
        let reporter = Arc::new(ProgressReporter::new());
        let callback_reporter = Arc::clone(&reporter);
        let result = coordinator
            .run_with_progress(move |p| callback_reporter.update(&p))
            .context("Crawl failed")?;
        if result.completed {
            reporter.finish("Crawl completed");
        } else {
            reporter.finish("Crawl interrupted");
        }
        result
    } else {
        coordinator.run().context("Crawl failed")?
    };

    let database = config.database.as_ref().map(|p| p.display().to_string());
    if config.show_progress {
        print_summary(&result, database.as_deref());
    }

    if !result.completed {
        info!("Crawl was interrupted before completion");
    }

    // The writer already logged the cause; repeat it where the run ends
    if !result.persisted() {
        error!(
            severity = "critical",
            dropped = result.writer.records_dropped,
            "Storage unavailable, no discovery records were persisted"
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("ospf_spider=debug,warn")
    } else {
        EnvFilter::new("ospf_spider=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
