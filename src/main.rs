use anyhow::{Context, Result};
use odds_monitor::config::{Config, Mode};
use odds_monitor::pipeline::OddsMonitor;
use odds_monitor::scheduler;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";
const DEFAULT_LOG_FILTER: &str = "odds_monitor=info";

/// Value following `flag` on the command line, e.g. `--config path.toml`.
fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn init_logging(log_file: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(file)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    init_logging(arg_value(&args, "--log-file"))?;

    let sim_mode = args.iter().any(|arg| arg == "--simulate");
    let config_path = arg_value(&args, "--config").unwrap_or(DEFAULT_CONFIG);

    // Load saved keys from .env (real env vars take precedence)
    Config::load_env_file();

    let mut config = Config::load(Path::new(config_path))?;
    if sim_mode {
        config.monitor.mode = Mode::Simulated;
    }

    println!();
    println!("  Odds Monitor v{}", env!("CARGO_PKG_VERSION"));
    println!("  =================");
    println!();
    if config.monitor.mode == Mode::Simulated {
        println!("  ** SIMULATION MODE ** (random-walk odds, no network)");
        println!();
    }
    for warning in config.validate() {
        tracing::warn!(%warning, "config");
        println!("  warning: {}", warning);
    }

    let refresh = Duration::from_secs(config.monitor.refresh_interval_s);
    let monitor = Arc::new(OddsMonitor::new(config));
    println!("  Sources: {}", monitor.source_names().join(", "));
    println!("  Refresh every {}s. Ctrl-C to stop.", refresh.as_secs());
    println!();

    match monitor.warm_up().await {
        Ok(report) => println!(
            "  Warm-up: {} quotes from {} sources, {} markets tracked",
            report.normalized, report.sources_ok, report.markets_updated
        ),
        Err(e) => {
            tracing::warn!(error = %e, "warm-up failed, continuing with scheduled refreshes");
            println!("  warning: {:#}", e);
        }
    }

    let cancel = CancellationToken::new();

    let mut listener = monitor.subscribe();
    let alert_cancel = cancel.clone();
    let alert_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = alert_cancel.cancelled() => break,
                alert = listener.recv() => match alert {
                    Some(alert) => println!("  [{:>4}] {}", alert.direction, alert.message()),
                    None => break,
                },
            }
        }
    });

    let (scheduler_task, _handle) = scheduler::spawn_monitor(monitor.clone(), refresh, cancel.clone());

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    cancel.cancel();

    let runs = scheduler_task.await.context("scheduler task failed")?;
    let _ = alert_task.await;

    let summary = monitor.summary();
    println!();
    println!(
        "  Stopped after {} cycles: {} markets, {} alerts ({})",
        runs, summary.markets, summary.alerts, summary.status
    );
    Ok(())
}
