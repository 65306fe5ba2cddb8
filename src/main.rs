use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tracing::{info, warn};

use nse_oi_tracker::api_server;
use nse_oi_tracker::config::{AppConfig, Mode};
use nse_oi_tracker::logging;
use nse_oi_tracker::models::Interpretation;
use nse_oi_tracker::nse::NseClient;
use nse_oi_tracker::pipeline::Pipeline;
use nse_oi_tracker::scheduler::{CycleOutcome, Scheduler};
use nse_oi_tracker::store::SqliteStore;
use nse_oi_tracker::summary::{self, SummaryGroup};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _guard = logging::init_logging()?;

    let config = AppConfig::from_env()?;
    config.validate()?;

    println!("{}", "=".repeat(60).blue());
    println!("{}", "NSE OI Tracker".green().bold());
    println!("{}", "=".repeat(60).blue());
    println!("{} Mode: {:?}", "ℹ".blue(), config.mode);
    println!("{} Symbols: {}", "ℹ".blue(), config.symbols.join(", "));
    println!("{} Database: {}", "ℹ".blue(), config.database_url);
    println!();

    info!(
        mode = ?config.mode,
        symbols = config.symbols.len(),
        refresh_secs = config.refresh_interval.as_secs(),
        "Starting OI tracker"
    );

    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    let client = NseClient::new(config.fetch_futures).context("Failed to build NSE client")?;
    let pipeline = Arc::new(Pipeline::new(client, store, config.index_symbols.clone()));

    let scheduler = Scheduler::new(
        Arc::clone(&pipeline),
        config.symbols.clone(),
        config.refresh_interval,
        config.max_concurrent,
    );

    match config.mode {
        Mode::Once => {
            let start_time = std::time::Instant::now();
            let outcomes = scheduler.run_once().await;
            print_outcomes(&outcomes, start_time.elapsed());

            let groups = summary::build_summary(pipeline.store()).await?;
            print_summary(&groups);
        }
        Mode::Watch => {
            println!("{}", "Watching, press Ctrl-C to stop...".cyan());
            scheduler.run_until(shutdown_signal()).await;
        }
        Mode::Server => {
            let watcher = tokio::spawn(async move { scheduler.run_until(shutdown_signal()).await });

            tokio::select! {
                res = api_server::start_server(Arc::clone(&pipeline), config.port) => res?,
                _ = shutdown_signal() => info!("Shutdown requested"),
            }

            if let Err(e) = watcher.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).blue());
    println!("{}", "Done!".green().bold());
    println!("{}", "=".repeat(60).blue());

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn print_outcomes(outcomes: &[CycleOutcome], elapsed: std::time::Duration) {
    let mut failed = Vec::new();

    for outcome in outcomes {
        match &outcome.result {
            Ok(snapshot) => println!(
                "  {} {} → ltp {:.2} ({:+.2}), {} / {}",
                "✓".green(),
                outcome.symbol.yellow(),
                snapshot.ltp,
                snapshot.change_in_ltp,
                snapshot.interpretation,
                snapshot.signal
            ),
            Err(e) => {
                println!("  {} {} → {}", "✗".red(), outcome.symbol.yellow(), e.kind());
                failed.push((outcome.symbol.clone(), e.to_string()));
            }
        }
    }

    println!();
    println!("{} Successful: {}", "✓".green(), outcomes.len() - failed.len());
    println!("{} Failed: {}", "✗".red(), failed.len());
    println!("{} Time taken: {:.2}s", "⏱".yellow(), elapsed.as_secs_f64());

    if !failed.is_empty() {
        println!();
        println!("{}", "Failed Symbols:".red());
        for (symbol, error) in failed.iter().take(10) {
            println!("  {} {} → {}", "✗".red(), symbol.yellow(), error.chars().take(80).collect::<String>());
        }
    }
    println!();
}

fn print_summary(groups: &[SummaryGroup]) {
    println!("{}", "=".repeat(60).blue());
    println!("{}", "Summary".cyan().bold());
    println!("{}", "=".repeat(60).blue());

    for group in groups {
        let title = match group.interpretation {
            Interpretation::LongBuildup | Interpretation::ShortCovering => group.interpretation.as_str().green().bold(),
            _ => group.interpretation.as_str().red().bold(),
        };
        println!("{} ({})", title, group.rows.len());

        for row in &group.rows {
            let windows: Vec<String> = row
                .windows
                .iter()
                .map(|w| {
                    let label = w.interpretation.map(|i| i.as_str()).unwrap_or("N/A");
                    format!("{}m: {}", w.minutes, label)
                })
                .collect();

            println!(
                "  {:<12} {:>10.2} {:>+8.2} {:>+8.2}%  {}  [{}]",
                row.symbol,
                row.ltp,
                row.change_in_ltp,
                row.pct_oi_change,
                row.time.format("%H:%M:%S"),
                windows.join(", ")
            );
        }
    }
}
