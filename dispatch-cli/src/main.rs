use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::mpsc;

use dispatch_cli::{
    LogMap, LogPayments, LogUpdates, ScriptEvent, ScriptedHeadings, ScriptedPositions,
    StraightLineRouter, prelude::*,
};
use dispatch_logic::{
    DispatchSettings, DispatchUiState, Dispatcher, PositionEvent, RawHeading, RoutingService,
    SearchReport, SearchResolver, StopId,
};
use dispatch_transport::{FileLookup, OsrmRouter, directions_url};

#[derive(Parser)]
struct Cli {
    /// JSON file with session settings, defaults are used for anything missing
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up comma separated phone numbers and print the stops found
    Resolve {
        /// JSON list of customer records
        #[arg(long)]
        customers: PathBuf,
        phones: String,
    },
    /// Run a dispatch session driven by a script of device events
    Replay {
        /// JSON list of customer records
        #[arg(long)]
        customers: PathBuf,
        /// One JSON event per line
        #[arg(long)]
        script: PathBuf,
        /// Connect waypoints with straight lines instead of asking a router
        #[arg(long, conflicts_with = "router")]
        straight_line: bool,
        /// Base URL of an OSRM server, overrides the built in one
        #[arg(long)]
        router: Option<String>,
        /// OSRM profile to route with when using --router
        #[arg(long, default_value = "driving")]
        profile: String,
    },
}

type Session<R> = Dispatcher<FileLookup, R, LogMap, LogPayments, LogUpdates>;

/// Longest we wait for outstanding route requests once the script is done
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

async fn load_settings(path: Option<&PathBuf>) -> Result<DispatchSettings> {
    let Some(path) = path else {
        return Ok(DispatchSettings::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    serde_json::from_str(&raw).context("Failed to parse settings")
}

fn log_report(report: &SearchReport) {
    for why in report.errors.iter() {
        warn!("{why}");
    }
    info!("{} stops found", report.stops.len());
}

async fn resolve(settings: DispatchSettings, customers: PathBuf, phones: String) -> Result {
    let lookup = FileLookup::open(customers).await?;
    let resolver = SearchResolver::new(lookup, &settings);

    let report = resolver.resolve(&phones).await;
    log_report(&report);

    for stop in report.stops.iter() {
        let directions = match stop.location {
            Some(location) => directions_url(location)?.to_string(),
            None => "no location".to_string(),
        };
        println!(
            "{}\t{}\t{:.2}\t{}\t{directions}",
            stop.id, stop.display_name, stop.amount_due, stop.order_summary
        );
    }

    Ok(())
}

async fn run_script<R: RoutingService>(
    session: &Session<R>,
    positions: &mpsc::Sender<PositionEvent>,
    headings: &mpsc::Sender<RawHeading>,
    script: Vec<ScriptEvent>,
) -> Result {
    for event in script {
        match event {
            ScriptEvent::Search { phones } => log_report(&session.search(&phones).await),
            ScriptEvent::Extend { phones } => log_report(&session.extend_search(&phones).await),
            ScriptEvent::Position {
                lat,
                long,
                accuracy,
            } => positions
                .send(ScriptEvent::position_event(lat, long, accuracy))
                .await
                .context("Position source closed")?,
            ScriptEvent::PositionError { error } => positions
                .send(PositionEvent::Error(error))
                .await
                .context("Position source closed")?,
            ScriptEvent::Heading {
                degrees,
                convention,
            } => headings
                .send(RawHeading {
                    degrees,
                    convention,
                })
                .await
                .context("Orientation source closed")?,
            ScriptEvent::Delivered { phone } => {
                session.mark_delivered(&StopId::new(phone)).await;
            }
            ScriptEvent::Wait { millis } => tokio::time::sleep(Duration::from_millis(millis)).await,
        }
    }

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while session.ui_state().await.pending_routes > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Gave up waiting for route requests");
    }

    Ok(())
}

async fn replay<R: RoutingService>(
    settings: DispatchSettings,
    router: R,
    customers: PathBuf,
    script: PathBuf,
) -> Result<DispatchUiState> {
    let lookup = FileLookup::open(customers).await?;
    let raw_script = tokio::fs::read_to_string(&script)
        .await
        .with_context(|| format!("Failed to read script {}", script.display()))?;
    let script = ScriptEvent::parse_script(&raw_script)?;

    let (position_tx, positions) = ScriptedPositions::new();
    let (heading_tx, headings) = ScriptedHeadings::new();

    let session = Session::new(
        settings,
        lookup,
        Arc::new(router),
        LogMap::default(),
        LogPayments,
        LogUpdates::default(),
    );

    let driver = async {
        let res = tokio::select! {
            res = run_script(&session, &position_tx, &heading_tx, script) => res,
            Ok(_) = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                Ok(())
            }
        };
        let state = session.ui_state().await;
        session.quit();
        res.map(|_| state)
    };

    let (session_res, state) = tokio::join!(session.main_loop(&positions, Some(&headings)), driver);
    session_res?;
    state
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_ref()).await?;

    match cli.command {
        Commands::Resolve { customers, phones } => resolve(settings, customers, phones).await,
        Commands::Replay {
            customers,
            script,
            straight_line,
            router,
            profile,
        } => {
            let state = if straight_line {
                replay(settings, StraightLineRouter::default(), customers, script).await?
            } else if let Some(url) = router {
                let router = OsrmRouter::with_server(url, profile)?;
                replay(settings, router, customers, script).await?
            } else {
                replay(settings, OsrmRouter::new()?, customers, script).await?
            };

            let encoded =
                serde_json::to_string_pretty(&state).context("Failed to encode final state")?;
            println!("{encoded}");
            Ok(())
        }
    }
}
