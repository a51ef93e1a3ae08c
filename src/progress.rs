//! Progress reporting for the crawler
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::crawl::{CrawlProgress, CrawlResult};
use crate::config::CrawlConfig;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays crawl status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &CrawlProgress) {
        let msg = format!(
            "Routers: {} | Failed: {} | Running: {}/{} | Pending: {} | Seen: {}",
            format_number(progress.visited),
            format_number(progress.failed),
            progress.running,
            progress.concurrency,
            progress.pending,
            progress.discovered,
        );

        self.bar.set_message(msg);
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the crawl
pub fn print_summary(result: &CrawlResult, database: Option<&str>) {
    let duration_secs = result.duration.as_secs_f64();

    println!();
    if result.completed {
        println!("{}", style("Crawl Complete").green().bold());
    } else {
        println!("{}", style("Crawl Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Routers:").bold(), format_number(result.visited));
    println!("  {} {}", style("Discovered:").bold(), format_number(result.discovered as u64));
    if result.failed_total() > 0 {
        let breakdown = result
            .failed
            .iter()
            .map(|(kind, n)| format!("{} {}", kind, n))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {} {} ({})",
            style("Dropped:").yellow().bold(),
            format_number(result.failed_total()),
            breakdown
        );
    }
    println!(
        "  {} {} connections, {} customers",
        style("Stored:").bold(),
        format_number(result.writer.connections),
        format_number(result.writer.customers)
    );
    if result.writer.partial_records > 0 {
        println!(
            "  {} {} routers with missing tables",
            style("Partial:").yellow().bold(),
            format_number(result.writer.partial_records)
        );
    }
    println!("  {} {:.1}s", style("Duration:").bold(), duration_secs);
    match (database, result.persisted()) {
        (Some(path), true) => println!("  {} {}", style("Database:").bold(), path),
        _ => println!(
            "  {} {}",
            style("Database:").red().bold(),
            style("nothing persisted").red()
        ),
    }
    if result.limit_reached {
        println!("  {}", style("Stopped at --max-routers limit").dim());
    }
    println!();
}

/// Print a header at the start of the crawl
pub fn print_header(config: &CrawlConfig) {
    println!();
    println!(
        "{} {}",
        style("ospf-spider").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Seed:").bold(), config.seed);
    println!("  {} {}", style("Concurrency:").bold(), config.concurrency);
    println!("  {} {}", style("Candidates:").bold(), config.passwords.len());
    match &config.database {
        Some(path) => println!("  {} {}", style("Database:").bold(), path.display()),
        None => println!("  {} {}", style("Database:").red().bold(), "not configured"),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
