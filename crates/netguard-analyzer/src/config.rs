//! Analyzer Configuration

use crate::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Analyzer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Session tracking settings
    pub session: SessionConfig,
    /// Integrity guard settings
    pub integrity: IntegrityConfig,
}

impl AnalyzerConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the tracker or guard cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.session.max_tracked_sessions == 0 {
            return Err(AnalyzerError::Config(
                "session.max_tracked_sessions must be greater than zero".into(),
            ));
        }
        if self.session.expiration_ms == 0 {
            return Err(AnalyzerError::Config(
                "session.expiration_ms must be greater than zero".into(),
            ));
        }
        if self.session.burst_gap_ms == 0 {
            return Err(AnalyzerError::Config(
                "session.burst_gap_ms must be greater than zero".into(),
            ));
        }
        if self.integrity.enabled && self.integrity.expected_module.trim().is_empty() {
            return Err(AnalyzerError::Config(
                "integrity.expected_module must not be empty when integrity is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Session tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard cap on tracked flows; the map is cleared when exceeded
    pub max_tracked_sessions: usize,
    /// Idle time after which a flow is pruned
    pub expiration_ms: u64,
    /// Gap that ends a burst
    pub burst_gap_ms: u64,
    /// Payloads at or below this size count as small
    pub small_payload_bytes: usize,
}

impl SessionConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_ms)
    }

    pub fn burst_gap(&self) -> Duration {
        Duration::from_millis(self.burst_gap_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_tracked_sessions: 2048,
            expiration_ms: 10_000,
            burst_gap_ms: 500,
            small_payload_bytes: 150,
        }
    }
}

/// Integrity guard configuration
///
/// The origin probe is off unless the embedding host opts in: only the host
/// knows the module name it ships the analyzer under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Probe the environment at all
    pub enabled: bool,
    /// Marker the running executable's file name must contain
    pub expected_module: String,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            expected_module: "netguard".into(),
        }
    }
}

impl IntegrityConfig {
    /// Origin probe enabled for `expected_module`
    pub fn verify_origin(expected_module: impl Into<String>) -> Self {
        Self {
            enabled: true,
            expected_module: expected_module.into(),
        }
    }
}
