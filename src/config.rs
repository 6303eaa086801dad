use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::scenario::{ScenarioKind, ScenarioOptions, DEFAULT_PLATFORM_TIMEOUT, PREFIX_LEN_RANGE};
use crate::vlan::ensure_distinct;

/// Who the generated material is for
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Students only see the task sheet
    #[default]
    Student,
    /// Teachers get answer sheets and progress logs
    Teacher,
    /// Developers additionally get self-check commands on every host
    Developer,
}

impl Role {
    /// Log filter used when neither the CLI nor the file sets one
    pub fn default_log_level(self) -> &'static str {
        match self {
            Role::Student => "error",
            Role::Teacher => "info",
            Role::Developer => "debug",
        }
    }

    pub fn is_developer(self) -> bool {
        self == Role::Developer
    }
}

/// Batch configuration: general settings plus the scenarios to generate
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    pub scenarios: Vec<ScenarioConfig>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.general.platform_timeout.is_zero() {
            return Err(ValidationError::InvalidGeneral(
                "platform_timeout must be greater than zero".to_string(),
            ));
        }

        if self.scenarios.is_empty() {
            return Err(ValidationError::InvalidScenario(
                "at least one scenario must be listed".to_string(),
            ));
        }

        for scenario in &self.scenarios {
            scenario.validate()?;
        }

        Ok(())
    }

    /// Total number of runs the batch will perform
    pub fn run_count(&self) -> usize {
        self.scenarios.iter().map(|s| s.seeds.len()).sum()
    }
}

/// Shared general configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub role: Role,
    #[serde(with = "humantime_serde")]
    pub platform_timeout: Duration,
    pub student_dir: PathBuf,
    pub teacher_dir: PathBuf,
    pub student_allowed_answers: bool,
    pub static_task_document: bool,
}

impl GeneralConfig {
    /// Log filter from the file, falling back to the role default
    pub fn log_level(&self) -> &str {
        self.log_level
            .as_deref()
            .unwrap_or_else(|| self.role.default_log_level())
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            role: Role::default(),
            platform_timeout: DEFAULT_PLATFORM_TIMEOUT,
            student_dir: PathBuf::from("student"),
            teacher_dir: PathBuf::from("teacher"),
            student_allowed_answers: false,
            static_task_document: true,
        }
    }
}

/// One scenario kind and the identifiers to generate it for
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScenarioConfig {
    pub kind: ScenarioKind,
    pub seeds: Vec<String>,
    #[serde(default)]
    pub options: ScenarioOptions,
}

impl ScenarioConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.seeds.is_empty() {
            return Err(ValidationError::InvalidScenario(format!(
                "{}: seeds cannot be an empty list",
                self.kind
            )));
        }
        if self.seeds.iter().any(|s| s.trim().is_empty()) {
            return Err(ValidationError::InvalidScenario(format!(
                "{}: seeds cannot be empty strings",
                self.kind
            )));
        }

        let options = &self.options;
        if let Some(prefix) = options.prefix_len {
            if !PREFIX_LEN_RANGE.contains(&prefix) {
                return Err(ValidationError::InvalidOptions(format!(
                    "{}: prefix_len {} is outside {}..={}",
                    self.kind,
                    prefix,
                    PREFIX_LEN_RANGE.start(),
                    PREFIX_LEN_RANGE.end()
                )));
            }
        }
        match options.vlan_count {
            Some(0) => {
                return Err(ValidationError::InvalidOptions(format!(
                    "{}: vlan_count must be at least 1",
                    self.kind
                )));
            }
            Some(count) if count > options.vlan_range.capacity() => {
                return Err(ValidationError::InvalidOptions(format!(
                    "{}: vlan_count {} exceeds the {} ids of the {:?} range",
                    self.kind,
                    count,
                    options.vlan_range.capacity(),
                    options.vlan_range
                )));
            }
            _ => {}
        }
        if let Some(vlans) = &options.vlans {
            ensure_distinct(vlans)
                .map_err(|e| ValidationError::InvalidOptions(format!("{}: {}", self.kind, e)))?;
        }
        if options != &ScenarioOptions::default() && !self.kind.accepts_options() {
            return Err(ValidationError::InvalidOptions(format!(
                "{} does not take layout options",
                self.kind
            )));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid scenario configuration: {0}")]
    InvalidScenario(String),
    #[error("Invalid scenario options: {0}")]
    InvalidOptions(String),
}
