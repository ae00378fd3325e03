//! TOML configuration for the QoS daemon.
//!
//! Every section is optional. Missing sections and keys fall back to the
//! engine defaults, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use qos_adjuster::AdjusterConfig;
use qos_adjuster::config::DEFAULT_STAGE_PIN_LIFETIME;
use serde::{Deserialize, Serialize};

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// Adjustment engine tuning.
    pub adjuster: AdjusterSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[adjuster]` section.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AdjusterSection {
    /// Maximum number of reply waits running at once.
    pub max_concurrent: usize,
    /// Upper bound on a single reply wait, in seconds. Unset means no bound.
    pub max_reply_wait_secs: Option<u64>,
    /// Lifetime of the pin that triggers staging, in seconds.
    pub stage_pin_lifetime_secs: u64,
    /// Host used in the staging protocol descriptor.
    pub stage_protocol_host: String,
    /// Port used in the staging protocol descriptor.
    pub stage_protocol_port: u16,
}

impl Default for AdjusterSection {
    fn default() -> Self {
        let engine = AdjusterConfig::default();
        Self {
            max_concurrent: engine.max_concurrent,
            max_reply_wait_secs: None,
            stage_pin_lifetime_secs: DEFAULT_STAGE_PIN_LIFETIME.as_secs(),
            stage_protocol_host: engine.stage_protocol_host,
            stage_protocol_port: engine.stage_protocol_port,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"qos::activity=info,warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use the defaults if no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)
                    .with_context(|| format!("failed to parse {}", p.display()))?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Render the effective configuration back to TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Typed engine configuration.
    pub fn adjuster_config(&self) -> AdjusterConfig {
        let section = &self.adjuster;
        AdjusterConfig {
            max_concurrent: section.max_concurrent,
            max_reply_wait: section.max_reply_wait_secs.map(Duration::from_secs),
            stage_pin_lifetime: Duration::from_secs(section.stage_pin_lifetime_secs),
            stage_protocol_host: section.stage_protocol_host.clone(),
            stage_protocol_port: section.stage_protocol_port,
        }
    }
}
