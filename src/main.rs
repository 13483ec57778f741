use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowtrack::{
    alerts::RiskAlertMonitor,
    engine::FeedMode,
    history::DensityHistory,
    scenario::{Scenario, ScenarioLoader},
    scheduler::TickScheduler,
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "FlowTrack crowd density engine")]
struct Cli {
    /// Path to a scenario YAML file (built-in festival grounds when omitted)
    #[arg(long, global = true)]
    scenario: Option<PathBuf>,

    /// Override the scenario seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "flowtrack=info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a fixed number of ticks on a virtual clock and print a summary
    Run {
        #[arg(long, default_value_t = 120)]
        ticks: u64,

        /// Write the density history as JSON
        #[arg(long)]
        history_out: Option<PathBuf>,
    },
    /// Serve the live state over HTTP and SSE
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Override the scenario tick cadence
        #[arg(long)]
        tick_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut scenario = match &cli.scenario {
        Some(path) => ScenarioLoader::new(".").load(path)?,
        None => Scenario::festival_grounds(),
    };
    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }

    match cli.command {
        Command::Run { ticks, history_out } => run_headless(scenario, ticks, history_out),
        Command::Serve {
            host,
            port,
            tick_ms,
        } => {
            if let Some(tick_ms) = tick_ms {
                scenario.tick_ms = tick_ms;
            }
            web::run(WebServerConfig {
                scenario,
                host,
                port,
            })
            .await
        }
    }
}

fn run_headless(scenario: Scenario, ticks: u64, history_out: Option<PathBuf>) -> Result<()> {
    if scenario.feed == FeedMode::External {
        bail!(
            "scenario '{}' expects external observations; use `serve` instead",
            scenario.name
        );
    }

    let mut engine = scenario.engine_builder().build()?;
    let history = Arc::new(Mutex::new(DensityHistory::new(scenario.history_len)));
    let alerts = Arc::new(Mutex::new(RiskAlertMonitor::new(scenario.alert_cooldown())));
    {
        let history = history.clone();
        let alerts = alerts.clone();
        engine.subscribe(move |snapshot| {
            history
                .lock()
                .expect("history lock poisoned")
                .record(snapshot);
            alerts
                .lock()
                .expect("alert monitor lock poisoned")
                .inspect(snapshot);
        });
    }

    let mut scheduler = TickScheduler::new(scenario.cadence());
    let Some(last) = scheduler.run_virtual(&mut engine, ticks) else {
        info!(scenario = %scenario.name, "no ticks requested");
        return Ok(());
    };

    for zone in &last.zones {
        info!(
            zone = %zone.key,
            name = %zone.name,
            people = zone.people,
            density = %format!("{:.3}", zone.density),
            intensity = %format!("{:.3}", zone.intensity),
            risk = ?zone.risk_level,
            color = %zone.risk_color,
            "final state"
        );
    }
    if let Some(hottest) = last.highest_risk() {
        info!(
            zone = %hottest.key,
            name = %hottest.name,
            risk = ?hottest.risk_level,
            "highest risk zone"
        );
    }
    let raised = alerts.lock().expect("alert monitor lock poisoned").recent().count();
    info!(
        scenario = %scenario.name,
        ticks = last.tick,
        people = last.total_people(),
        alerts = raised,
        average_tick = ?scheduler.average_tick_time(),
        "run complete"
    );

    if let Some(path) = history_out {
        history
            .lock()
            .expect("history lock poisoned")
            .write_json(&path)?;
        info!(path = %path.display(), "history written");
    }

    engine.dispose();
    Ok(())
}
