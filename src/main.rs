//! # PTT Text Crawler
//!
//! A config-driven crawler for PTT boards. Given a JSON file of task
//! descriptions, it locates the articles each task asks for — most recent
//! N, a clock window on today, a title/author search, a comment-content
//! scan, a single index, or a calendar-date range — fetches them over a
//! single polite session, and writes each result set out as structured
//! JSON.
//!
//! ## Usage
//!
//! ```sh
//! ptt_text_crawler tasks.json -c my_private_password.json
//! ```
//!
//! ## Architecture
//!
//! One task flows through a fixed pipeline:
//! 1. **Resolving**: the task's strategy picks candidate indices and a
//!    stop rule (sparse time-window probing happens here)
//! 2. **Fetching**: candidates are fetched one at a time through the
//!    paced session
//! 3. **Filtering**: the exact window/predicate is re-checked against
//!    every fetched article
//! 4. **Writing**: the result set lands in the task's output file,
//!    ascending by index
//!
//! Tasks run sequentially; a failed task is logged and the batch moves on.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod assembler;
mod board;
mod cli;
mod config;
mod error;
mod locator;
mod models;
mod output;
mod runner;
mod strategy;
mod utils;
mod web;

use board::PacedBoard;
use cli::Cli;
use runner::run_batch;
use web::WebBoard;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ptt_text_crawler starting up");

    // Parse CLI
    let args = Cli::parse();

    // ---- Load task config & credentials ----
    let crawl_config = match config::load_config(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(path = %args.config, error = %e, "Failed to load task configuration");
            return Err(e);
        }
    };

    let credentials = match &args.credentials {
        Some(path) => match config::load_credentials(path) {
            Ok(creds) => Some(creds),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to load credentials");
                return Err(e);
            }
        },
        None => None,
    };

    let delay = match args.delay {
        Some(secs) => std::time::Duration::from_secs_f64(secs.max(0.0)),
        None => crawl_config.options.delay(),
    };
    info!(delay_secs = delay.as_secs_f64(), "Request pacing configured");

    // ---- Connect ----
    let session = WebBoard::connect(&args.base_url, credentials).await?;
    let mut session = PacedBoard::new(session, delay);

    // ---- Run the batch ----
    let today = Local::now().date_naive();
    let reports = run_batch(&mut session, crawl_config.tasks, today).await;

    // ---- Summary ----
    let ok = reports.iter().filter(|r| r.is_ok()).count();
    let failed = reports.len() - ok;
    for report in &reports {
        match &report.error {
            Some(e) => warn!(kind = report.kind, board = %report.board, error = %e, "task failed"),
            None => info!(
                kind = report.kind,
                board = %report.board,
                found = report.found,
                output = ?report.output,
                "task ok"
            ),
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        total = reports.len(),
        ok,
        failed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    if reports
        .iter()
        .any(|r| r.error.as_ref().is_some_and(|e| e.is_fatal()))
    {
        return Err("session lost before the batch finished".into());
    }
    Ok(())
}
