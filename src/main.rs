use std::env;
use std::path::Path;

use chrono::{Datelike, Utc};
use portfolio_ledger::constants::service::DEFAULT_CONFIG_PATH;
use portfolio_ledger::services::portfolio::{EventLog, PortfolioService};
use portfolio_ledger::{EngineConfig, Severity, SnapshotBus};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Load Configuration
    let config_path = env::var("LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = if Path::new(&config_path).exists() {
        EngineConfig::load(&config_path)?
    } else {
        EngineConfig::default()
    };

    // Setup Logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Loaded Configuration: {:?}", config);

    let log_path = env::var("EVENT_LOG").unwrap_or_else(|_| config.event_log_path.clone());
    let log = EventLog::from_jsonl(&log_path)?;

    let options = config.replay_options(Utc::now().year());
    let bus = SnapshotBus::new(config.snapshot_channel_capacity);
    let service = PortfolioService::new(log, options, bus);
    let update = service.refresh()?;

    for d in &update.diagnostics {
        match d.severity {
            Severity::Info => info!("event {} [{}] {}", d.event_id, d.code, d.message),
            Severity::Warning => warn!("event {} [{}] {}", d.event_id, d.code, d.message),
            Severity::Error | Severity::Fatal => {
                error!("event {} [{}] {}", d.event_id, d.code, d.message)
            }
        }
    }
    if let Some(e) = &update.halted {
        error!(
            "Portfolio reconstructed through event {:?}, then failed: {}",
            update.snapshot.as_of_event_id(),
            e
        );
    }

    println!("{}", serde_json::to_string_pretty(update.snapshot.as_ref())?);
    Ok(())
}
