//! Command handler modules for sqc-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod simulate;

use anyhow::Result;
use sqc_config::AutopilotConfig;
use sqc_db::PgStore;
use sqc_ingest::{Autopilot, PutOutcome};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Resolve the engine config. No paths means built-in defaults.
pub fn load_config(paths: &[String]) -> Result<AutopilotConfig> {
    if paths.is_empty() {
        return Ok(AutopilotConfig::default());
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = sqc_config::load_layered_yaml(&path_refs)?;
    tracing::debug!(config_hash = %loaded.config_hash, "config loaded");
    AutopilotConfig::from_loaded(&loaded)
}

/// Coordinator over the Postgres store named by SQC_DATABASE_URL.
pub async fn pg_autopilot(config_paths: &[String]) -> Result<Autopilot> {
    let cfg = load_config(config_paths)?;
    let pool = sqc_db::connect_from_env().await?;
    let store = PgStore::new(pool, cfg.tables.clone())?;
    Ok(Autopilot::new(cfg, Arc::new(store.clone()), Arc::new(store)))
}

pub fn print_put_outcome(outcome: &PutOutcome) {
    match *outcome {
        PutOutcome::Advanced { old, new, rounds } => {
            println!("outcome=advanced old={old} new={new} rounds={rounds}")
        }
        PutOutcome::Parked { last } => println!("outcome=parked cursor={last}"),
        PutOutcome::Duplicate { last } => println!("outcome=duplicate cursor={last}"),
    }
}
