//! Runner configuration
//!
//! One JSON document holds everything a session needs: log level,
//! coordinator settings, risk profiles, simulated venue settings and the
//! script to replay.

use aegis_core::{Price, Quantity, RiskProfile, Side, StrategyId, Symbol};
use aegis_gateway::{Fault, SimulatorConfig, VenueError, VenueOp};
use aegis_order_manager::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
    pub coordinator: CoordinatorConfig,
    pub profiles: HashMap<StrategyId, RiskProfile>,
    pub simulator: SimulatorConfig,
    pub script: Vec<ScriptStep>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            coordinator: CoordinatorConfig::default(),
            profiles: HashMap::new(),
            simulator: SimulatorConfig::default(),
            script: Vec::new(),
        }
    }
}

/// One scripted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Emit a strategy signal
    Signal {
        strategy: StrategyId,
        symbol: Symbol,
        side: Side,
        quantity: Quantity,
        #[serde(default)]
        price: Option<Price>,
    },
    /// Venue executes the intent's in-flight order (all of it if no quantity)
    Fill {
        strategy: StrategyId,
        symbol: Symbol,
        side: Side,
        #[serde(default)]
        quantity: Option<Quantity>,
        price: Price,
    },
    /// Cancel the intent's in-flight order
    Cancel {
        strategy: StrategyId,
        symbol: Symbol,
        side: Side,
    },
    /// Mark a symbol for unrealized P&L
    Mark { symbol: Symbol, price: Price },
    /// Queue venue failures for the next calls of an operation
    Fault {
        op: ScriptOp,
        kind: FaultKind,
        #[serde(default = "one")]
        times: usize,
    },
    /// Pause the script
    Wait { ms: u64 },
}

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOp {
    Submit,
    Cancel,
    Query,
}

impl From<ScriptOp> for VenueOp {
    fn from(op: ScriptOp) -> Self {
        match op {
            ScriptOp::Submit => VenueOp::Submit,
            ScriptOp::Cancel => VenueOp::Cancel,
            ScriptOp::Query => VenueOp::Query,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Network,
    RateLimited,
    Timeout,
    Unavailable,
    /// Call takes effect but the response is lost
    LostAck,
    InsufficientFunds,
}

impl FaultKind {
    pub fn to_fault(self) -> Fault {
        match self {
            FaultKind::Network => Fault::Fail(VenueError::Network("scripted".into())),
            FaultKind::RateLimited => Fault::Fail(VenueError::RateLimited),
            FaultKind::Timeout => Fault::Fail(VenueError::Timeout),
            FaultKind::Unavailable => Fault::Fail(VenueError::Unavailable("scripted".into())),
            FaultKind::LostAck => Fault::ApplyThenTimeout,
            FaultKind::InsufficientFunds => {
                Fault::Fail(VenueError::InsufficientFunds("scripted".into()))
            }
        }
    }
}

/// Load runner configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunnerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<RunnerConfig, ConfigError> {
    let config: RunnerConfig = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<RunnerConfig, ConfigError> {
    let default_config = include_str!("default_config.json");
    load_config_from_str(default_config)
}

impl RunnerConfig {
    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = self.coordinator.problems();

        if self.profiles.is_empty() {
            problems.push("at least one risk profile is required".to_string());
        }
        for (strategy, profile) in &self.profiles {
            if profile.max_position_size.is_sign_negative() {
                problems.push(format!("{}: max_position_size is negative", strategy));
            }
            if profile.max_daily_loss.is_sign_negative() {
                problems.push(format!("{}: max_daily_loss is negative", strategy));
            }
        }
        for (i, step) in self.script.iter().enumerate() {
            if let ScriptStep::Signal {
                strategy, quantity, ..
            } = step
            {
                if !self.profiles.contains_key(strategy) {
                    problems.push(format!("script[{}]: no profile for {}", i, strategy));
                }
                if quantity.is_sign_negative() {
                    problems.push(format!("script[{}]: negative quantity", i));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}
