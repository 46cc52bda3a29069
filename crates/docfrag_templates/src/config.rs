//! Pool configuration.

use std::fs;
use std::path::Path;

use minijinja::UndefinedBehavior;
use serde::{Deserialize, Serialize};

use crate::error::TemplateResult;

/// How templates treat values missing from the render data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedMode {
    /// Missing values print as empty and iterate as empty sequences.
    #[default]
    Lenient,
    /// Any use of a missing value is an execution error.
    Strict,
}

impl UndefinedMode {
    pub(crate) fn behavior(self) -> UndefinedBehavior {
        match self {
            Self::Lenient => UndefinedBehavior::Lenient,
            Self::Strict => UndefinedBehavior::Strict,
        }
    }
}

/// Settings applied to every template instance a pool compiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Idle instances kept per template name; extra released instances are
    /// dropped.
    pub max_idle_per_template: usize,
    /// Instruction budget for a single render (unlimited when unset).
    pub fuel: Option<u64>,
    pub undefined: UndefinedMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_template: 16,
            fuel: None,
            undefined: UndefinedMode::default(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_idle_per_template(mut self, max_idle: usize) -> Self {
        self.max_idle_per_template = max_idle;
        self
    }

    pub fn fuel(mut self, fuel: Option<u64>) -> Self {
        self.fuel = fuel;
        self
    }

    pub fn undefined(mut self, mode: UndefinedMode) -> Self {
        self.undefined = mode;
        self
    }

    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(content: &str) -> TemplateResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> TemplateResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}
