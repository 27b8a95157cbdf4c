//! CallBridge Simulator
//!
//! Runs a TOML scenario against the in-memory platform and prints every
//! outward bridge event as one JSON line on stdout. Logs go to stderr.
//!
//! ```text
//! callbridge-sim crates/callbridge-sim/scenarios/bluetooth_drop.toml --log-level debug
//! ```

mod scenario;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use callbridge_core::config::BridgeConfig;
use callbridge_core::logging::{parse_log_level, setup_logging, LogFormat};
use callbridge_core::CallBridge;

use crate::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a call-bridge scenario against a simulated handset", long_about = None)]
struct Args {
    /// Scenario file (TOML)
    scenario: PathBuf,

    /// Bridge configuration file, overrides the scenario's [config] table
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(parse_log_level(&args.log_level)?, args.log_format)?;

    let scenario = Scenario::from_file(&args.scenario)?;
    let config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => scenario.config.clone().unwrap_or_default(),
    };

    run(scenario, config).await
}

async fn run(scenario: Scenario, config: BridgeConfig) -> Result<()> {
    info!(
        "Running scenario '{}' ({} steps)",
        scenario.name.as_deref().unwrap_or("unnamed"),
        scenario.steps.len()
    );

    let platform = Arc::new(scenario.platform.build()?);
    let bridge = CallBridge::new(config, platform.services())?;

    let start = Instant::now();
    let mut events = bridge.subscribe_receiver();
    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        loop {
            match events.recv().await {
                Ok(event) => {
                    let line = json!({
                        "at_ms": start.elapsed().as_millis() as u64,
                        "event": event.name(),
                        "payload": event.payload(),
                    });
                    println!("{}", line);
                    printed += 1;
                }
                Err(RecvError::Lagged(skipped)) => warn!("Event printer lagged, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
        printed
    });

    for step in &scenario.steps {
        sleep_until(start + Duration::from_millis(step.at_ms)).await;
        debug!("t={}ms {:?}", step.at_ms, step.action);
        step.action.apply(&bridge, &platform);
    }

    sleep_until(start + Duration::from_millis(scenario.duration_ms() + scenario.settle_ms)).await;
    bridge.shutdown();
    drop(bridge);

    match tokio::time::timeout(Duration::from_secs(1), printer).await {
        Ok(Ok(printed)) => info!("Scenario finished, {} events", printed),
        Ok(Err(e)) => warn!("Event printer failed: {}", e),
        Err(_) => warn!("Event printer did not finish"),
    }

    Ok(())
}
