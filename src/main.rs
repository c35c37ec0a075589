//! CLI entry point for the transit board.
//!
//! `run` keeps two background loops polling the trip update and service alert
//! feeds while the render loop draws the latest results. `snapshot` fetches
//! both feeds once and prints what the board would show.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use transit_board::{
    alerts,
    arrivals::project,
    config::BoardConfig,
    fetch::{FeedClient, HttpSource, RetryPolicy},
    logging,
    mailbox::Mailbox,
    output::{Snapshot, print_json, print_pretty},
    parser::decode_or_empty,
    render::{LogRenderer, RenderLoop},
    scheduler::{AlertUpdater, ArrivalUpdater, RestartPolicy, Supervisor},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "transit_board")]
#[command(about = "Shows upcoming departures and service alerts for a few stops", long_about = None)]
struct Cli {
    /// INI file with a [transit] section
    #[arg(short, long, env = "TRANSIT_BOARD_CONFIG", default_value = "config.ini")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Poll the feeds and drive the display until interrupted (default)
    Run,
    /// Fetch both feeds once and print the board as JSON
    Snapshot,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok(); // Load .env file

    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| logging::DEFAULT_LOG_FILE.to_string());
    let _log_guard = match logging::init(&log_file_path) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Transit board failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = BoardConfig::load(&cli.config)
        .with_context(|| format!("cannot load configuration from {}", cli.config.display()))?;
    if let Ok(key) = std::env::var("TRANSIT_API_KEY") {
        if !key.is_empty() {
            config = config.with_api_key(key);
        }
    }

    info!(
        config = %cli.config.display(),
        stops = config.stops.len(),
        max_rows = config.max_rows,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_board(config).await,
        Commands::Snapshot => {
            snapshot(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Runs both update loops and the render loop until shutdown.
async fn run_board(config: BoardConfig) -> Result<ExitCode> {
    let config = Arc::new(config);
    let cancel = CancellationToken::new();
    let retry = RetryPolicy::default().with_max_attempts(config.max_attempts);
    let mut supervisor = Supervisor::new(cancel.clone(), RestartPolicy::default());

    // First sessions are built here so TLS or auth problems stop startup.
    let arrivals = Mailbox::new();
    let trip_updater = ArrivalUpdater::from_config(
        &config,
        FeedClient::new(HttpSource::for_auth(&config.auth)?, retry.clone()),
    );
    let (trip_config, trip_retry) = (config.clone(), retry.clone());
    supervisor.spawn(
        "trip_updates",
        config.trip_update_interval,
        arrivals.clone(),
        trip_updater,
        move || {
            let source = HttpSource::for_auth(&trip_config.auth)?;
            Ok(ArrivalUpdater::from_config(
                &trip_config,
                FeedClient::new(source, trip_retry.clone()),
            ))
        },
    );

    let alerts = Mailbox::new();
    let alert_updater = AlertUpdater::from_config(
        &config,
        FeedClient::new(HttpSource::for_auth(&config.auth)?, retry.clone()),
    );
    let (alert_config, alert_retry) = (config.clone(), retry);
    supervisor.spawn(
        "service_alerts",
        config.service_alert_interval,
        alerts.clone(),
        alert_updater,
        move || {
            let source = HttpSource::for_auth(&alert_config.auth)?;
            Ok(AlertUpdater::from_config(
                &alert_config,
                FeedClient::new(source, alert_retry.clone()),
            ))
        },
    );

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                interrupt.cancel();
            }
            Err(e) => warn!(error = %e, "Cannot listen for interrupts"),
        }
    });

    let mut render = RenderLoop::new(LogRenderer::default(), arrivals, alerts, config.frame_rate);
    let rendered = render.run(&cancel).await;

    let clean = supervisor.shutdown(SHUTDOWN_TIMEOUT).await;
    rendered?;

    if clean {
        info!(frames = render.renderer().frames(), "Shut down cleanly");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Background loops did not shut down cleanly");
        Ok(ExitCode::FAILURE)
    }
}

/// Fetches both feeds once and prints what the board would show.
#[tracing::instrument(skip_all)]
async fn snapshot(config: &BoardConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let retry = RetryPolicy::default().with_max_attempts(config.max_attempts);
    let trips = FeedClient::new(HttpSource::for_auth(&config.auth)?, retry.clone());
    let service_alerts = FeedClient::new(HttpSource::for_auth(&config.auth)?, retry);

    let (trip_bytes, alert_bytes) = tokio::try_join!(
        trips.fetch(&config.trip_update_url, &cancel),
        service_alerts.fetch(&config.service_alerts_url, &cancel),
    )?;

    let generated_at = Utc::now();
    let trip_feed = trip_bytes.map(|bytes| decode_or_empty(&bytes)).unwrap_or_default();
    let alert_feed = alert_bytes.map(|bytes| decode_or_empty(&bytes)).unwrap_or_default();

    let informed_ids = config.informed_ids();
    let alert = if config.alerts_active_only {
        alerts::select_at(&alert_feed, &informed_ids, &config.language, generated_at)
    } else {
        alerts::select(&alert_feed, &informed_ids, &config.language)
    };

    let snapshot = Snapshot {
        generated_at,
        arrivals: project(&trip_feed, &config.stops, generated_at, config.max_rows),
        alert,
    };
    print_pretty(&snapshot);
    print_json(&snapshot)
}
