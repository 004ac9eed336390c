//! Plugin host configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PluginHostError, PluginResult};

/// Whether the monitor watches compiled shared libraries directly, or
/// source files it compiles itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Watch for already-compiled shared libraries.
    Binary,
    /// Watch source files and (re)compile them as needed.
    Source,
}

/// Tunable knobs for the monitor and manager.
///
/// The numeric defaults match the constants named in the specification
/// (200ms pre-ready poll, 2s post-ready poll, a 25-tick ready gate, and a
/// ten-attempt/250ms sidecar replacement retry) but none of them are a
/// contract — see the "tunable, not a contract" design note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginHostConfig {
    /// Directories the monitor scans for plugin artifacts.
    pub paths: Vec<PathBuf>,
    /// Binary vs. source mode.
    pub mode: MonitorMode,
    /// Poll delay before the monitor first reaches "ready".
    #[serde(with = "duration_millis")]
    pub poll_delay_before_ready: Duration,
    /// Poll delay once the monitor has reached "ready".
    #[serde(with = "duration_millis")]
    pub poll_delay_after_ready: Duration,
    /// How many `sync` ticks between drains of the monitor's load-queue
    /// once the manager is already ready.
    pub sync_gate_ticks: u64,
    /// Attempts to delete the live library before giving up on a `.new`
    /// sidecar replacement.
    pub replace_attempts: u32,
    /// Delay between replacement attempts.
    #[serde(with = "duration_millis")]
    pub replace_retry_delay: Duration,
    /// Path to the allow-list filter file (relative to the working directory).
    pub allow_file: PathBuf,
    /// Path to the block-list filter file (relative to the working directory).
    pub block_file: PathBuf,
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            mode: MonitorMode::Binary,
            poll_delay_before_ready: Duration::from_millis(200),
            poll_delay_after_ready: Duration::from_secs(2),
            sync_gate_ticks: 25,
            replace_attempts: 10,
            replace_retry_delay: Duration::from_millis(250),
            allow_file: PathBuf::from("allow.ini"),
            block_file: PathBuf::from("block.ini"),
        }
    }
}

impl PluginHostConfig {
    /// Parse a configuration from TOML text, falling back to defaults for
    /// any field the document omits.
    pub fn from_toml_str(text: &str) -> PluginResult<Self> {
        toml::from_str(text).map_err(|e| PluginHostError::Config(e.to_string()))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
