//! Configuration management with validation and defaults
//!
//! Every section has sensible defaults and `#[serde(default)]`, so a TOML
//! file only needs to name the values it changes.

use crate::errors::ConfigError;
use crate::game::types::Multiplier;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftoffConfig {
    pub round: RoundConfig,
    pub crash: CrashConfig,
    pub ledger: LedgerConfig,
    pub history: HistoryConfig,
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
}

/// Phase timings for the round state machine
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Countdown length in ticks (one tick per countdown_tick_ms)
    pub countdown_seconds: u32,
    pub countdown_tick_ms: u64,
    pub multiplier_tick_ms: u64,
    /// Multiplier increase applied on every Active tick
    pub multiplier_step: Multiplier,
    /// Pause after a crash before the next round may start
    pub settle_delay_ms: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: 5,
            countdown_tick_ms: 1_000,
            multiplier_tick_ms: 100,
            multiplier_step: Multiplier::from_hundredths(1),
            settle_delay_ms: 3_000,
        }
    }
}

impl RoundConfig {
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn multiplier_tick(&self) -> Duration {
        Duration::from_millis(self.multiplier_tick_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Which crash policy drives the rounds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrashPolicy {
    Hazard,
    Presampled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub policy: CrashPolicy,
    /// D in `min((m - 1) / D, cap)`
    pub hazard_divisor: f64,
    pub hazard_cap: f64,
    /// Hard stop for the hazard policy
    pub ceiling: Multiplier,
    /// k in `1 + U^k * (max - 1)`
    pub presampled_exponent: f64,
    pub presampled_max: Multiplier,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            policy: CrashPolicy::Hazard,
            hazard_divisor: 50.0,
            hazard_cap: 0.1,
            ceiling: Multiplier::from_hundredths(1_000),
            presampled_exponent: 0.65,
            presampled_max: Multiplier::from_hundredths(1_500),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub starting_balance: u64,
    pub max_username_len: usize,
    pub min_bet: u64,
    pub max_bet: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1_000,
            max_username_len: 20,
            min_bet: 1,
            max_bet: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub recent_capacity: usize,
    pub history_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 10,
            history_capacity: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Per-observer broadcast buffer before slow clients start lagging
    pub event_buffer: usize,
    pub mailbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            event_buffer: 1_024,
            mailbox_capacity: 1_024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_filter: String,
    pub enable_metrics: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_filter: "liftoff=info,tower_http=info".to_string(),
            enable_metrics: true,
        }
    }
}

impl LiftoffConfig {
    /// Short timings for demos and tests
    pub fn fast() -> Self {
        Self {
            round: RoundConfig {
                countdown_seconds: 3,
                countdown_tick_ms: 100,
                multiplier_tick_ms: 10,
                settle_delay_ms: 300,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Read and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::InvalidValue(msg.to_string()));

        if self.round.countdown_tick_ms == 0 || self.round.multiplier_tick_ms == 0 {
            return invalid("tick intervals must be > 0");
        }
        if self.round.multiplier_step.hundredths() == 0 {
            return invalid("multiplier_step must be > 0");
        }
        if !(self.crash.hazard_divisor > 0.0) {
            return invalid("hazard_divisor must be > 0");
        }
        if !(self.crash.hazard_cap > 0.0 && self.crash.hazard_cap <= 1.0) {
            return invalid("hazard_cap must be within (0, 1]");
        }
        if self.crash.ceiling <= Multiplier::ONE || self.crash.presampled_max <= Multiplier::ONE {
            return invalid("crash ceilings must be above 1.00");
        }
        if !(self.crash.presampled_exponent > 0.0) {
            return invalid("presampled_exponent must be > 0");
        }
        if self.ledger.starting_balance == 0 {
            return invalid("starting_balance must be > 0");
        }
        if self.ledger.max_username_len == 0 {
            return invalid("max_username_len must be > 0");
        }
        if self.ledger.min_bet == 0 {
            return invalid("min_bet must be > 0");
        }
        if matches!(self.ledger.max_bet, Some(max) if max < self.ledger.min_bet) {
            return invalid("max_bet must be >= min_bet");
        }
        if self.history.recent_capacity == 0 || self.history.history_capacity == 0 {
            return invalid("history capacities must be > 0");
        }
        if self.server.event_buffer == 0 || self.server.mailbox_capacity == 0 {
            return invalid("server buffers must be > 0");
        }

        Ok(())
    }
}
