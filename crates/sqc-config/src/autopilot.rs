use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sqc_schemas::{BatchSize, FieldNames};

use crate::{load_layered_yaml_from_strings, LoadedConfig};

/// Top-level key under which the engine configuration lives.
pub const CONFIG_SECTION: &str = "autopilot";

/// How cursor writes guard against concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMode {
    /// Read the cursor, decide, write. No conflict detection; racing writes
    /// are harmless because the canonical cursor is the highest recorded value.
    #[default]
    Optimistic,
    /// Every cursor write is a compare-and-record against the value read.
    Atomic,
}

impl AdvanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvanceMode::Optimistic => "optimistic",
            AdvanceMode::Atomic => "atomic",
        }
    }
}

/// Postgres table names for the two logical tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TableNames {
    pub items: String,
    pub cursor: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            items: "sqc_items".to_string(),
            cursor: "sqc_cursor".to_string(),
        }
    }
}

impl TableNames {
    /// Names are interpolated into SQL, so only plain lowercase identifiers
    /// are accepted.
    pub fn validate(&self) -> Result<()> {
        for (key, name) in [("tables.items", &self.items), ("tables.cursor", &self.cursor)] {
            if !is_plain_identifier(name) {
                bail!(
                    "invalid {key} '{name}': expected [a-z_][a-z0-9_]* (max 63 chars)"
                );
            }
        }
        if self.items == self.cursor {
            bail!("tables.items and tables.cursor must differ");
        }
        Ok(())
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Engine configuration, resolved once and handed to constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AutopilotConfig {
    /// Document field holding the queue key.
    pub queue_field: String,
    /// Document field holding the sequence number.
    pub seq_field: String,
    /// Scan-ahead window size.
    pub batch_size: BatchSize,
    pub advance_mode: AdvanceMode,
    /// Atomic mode only: scan-round retries after a compare-and-record conflict.
    pub cas_retries: u32,
    /// Optional cap on scan rounds per put. `None` scans until the run ends.
    pub max_scan_rounds: Option<u32>,
    pub tables: TableNames,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        let fields = FieldNames::default();
        Self {
            queue_field: fields.queue_field,
            seq_field: fields.seq_field,
            batch_size: BatchSize::DEFAULT,
            advance_mode: AdvanceMode::default(),
            cas_retries: 3,
            max_scan_rounds: None,
            tables: TableNames::default(),
        }
    }
}

impl AutopilotConfig {
    /// Read the `autopilot` section of a loaded config. A missing section
    /// yields the defaults.
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg = match loaded.config_json.get(CONFIG_SECTION) {
            Some(section) => serde_json::from_value::<AutopilotConfig>(section.clone())
                .with_context(|| format!("invalid '{CONFIG_SECTION}' config section"))?,
            None => AutopilotConfig::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_strings(yaml_docs: &[&str]) -> Result<Self> {
        let loaded = load_layered_yaml_from_strings(yaml_docs)?;
        Self::from_loaded(&loaded)
    }

    pub fn with_batch_size(mut self, batch_size: BatchSize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_advance_mode(mut self, mode: AdvanceMode) -> Self {
        self.advance_mode = mode;
        self
    }

    pub fn with_max_scan_rounds(mut self, rounds: Option<u32>) -> Self {
        self.max_scan_rounds = rounds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_field.trim().is_empty() || self.seq_field.trim().is_empty() {
            bail!("queue_field and seq_field must be non-empty");
        }
        if self.queue_field == self.seq_field {
            bail!(
                "queue_field and seq_field must differ (both '{}')",
                self.queue_field
            );
        }
        if self.max_scan_rounds == Some(0) {
            bail!("max_scan_rounds must be >= 1 when set");
        }
        self.tables.validate()
    }

    pub fn fields(&self) -> FieldNames {
        FieldNames {
            queue_field: self.queue_field.clone(),
            seq_field: self.seq_field.clone(),
        }
    }
}
