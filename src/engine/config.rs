//! Engine Configuration
//!
//! Evaluation budgets for caller-supplied logic. Every field has a default;
//! a config file only names what it changes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::observability::{log_event_with_fields, Event};
use crate::sandbox::Sandbox;

use super::errors::{ConfigError, ConfigResult};

/// Validation engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline for a custom field rule (default: 100)
    #[serde(default = "default_custom_rule_timeout_ms")]
    pub custom_rule_timeout_ms: u64,

    /// Deadline for a custom conditional (default: 250)
    #[serde(default = "default_conditional_timeout_ms")]
    pub conditional_timeout_ms: u64,

    /// Interpreter steps per script (default: 1 000 000)
    #[serde(default = "default_max_script_steps")]
    pub max_script_steps: u64,

    /// Largest accepted script source (default: 64 KiB)
    #[serde(default = "default_max_script_bytes")]
    pub max_script_bytes: usize,

    /// Deepest accepted expression or logic-tree nesting (default: 64)
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

fn default_custom_rule_timeout_ms() -> u64 {
    100
}

fn default_conditional_timeout_ms() -> u64 {
    250
}

fn default_max_script_steps() -> u64 {
    1_000_000
}

fn default_max_script_bytes() -> usize {
    64 * 1024
}

fn default_max_nesting_depth() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            custom_rule_timeout_ms: default_custom_rule_timeout_ms(),
            conditional_timeout_ms: default_conditional_timeout_ms(),
            max_script_steps: default_max_script_steps(),
            max_script_bytes: default_max_script_bytes(),
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

impl EngineConfig {
    /// Loads and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, is not valid JSON,
    /// or sets a zero budget.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_json(&content)?;

        let location = path.display().to_string();
        log_event_with_fields(Event::ConfigLoaded, &[("path", location.as_str())]);
        Ok(config)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects budgets that would make every script fail.
    pub fn validate(&self) -> ConfigResult<()> {
        let budgets = [
            ("custom_rule_timeout_ms", self.custom_rule_timeout_ms == 0),
            ("conditional_timeout_ms", self.conditional_timeout_ms == 0),
            ("max_script_steps", self.max_script_steps == 0),
            ("max_script_bytes", self.max_script_bytes == 0),
            ("max_nesting_depth", self.max_nesting_depth == 0),
        ];
        match budgets.iter().find(|(_, zero)| *zero) {
            Some((name, _)) => Err(ConfigError::Invalid(format!("{} must be greater than zero", name))),
            None => Ok(()),
        }
    }

    /// Sandbox limits derived from this config
    pub fn sandbox(&self) -> Sandbox {
        Sandbox {
            custom_rule_timeout_ms: self.custom_rule_timeout_ms,
            conditional_timeout_ms: self.conditional_timeout_ms,
            max_steps: self.max_script_steps,
            max_script_bytes: self.max_script_bytes,
            max_nesting_depth: self.max_nesting_depth,
        }
    }
}
