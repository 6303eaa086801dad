use crate::config::{Config, GeneralConfig, Role, ScenarioConfig};
use crate::scenario::{ScenarioKind, ScenarioOptions};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration {:?}", config_path))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration {:?}", config_path))?;

    config.validate()?;

    info!(
        "Configuration lists {} scenario(s), {} run(s)",
        config.scenarios.len(),
        config.run_count()
    );
    Ok(config)
}

/// CLI arguments that can override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub role: Option<Role>,
    pub log_level: Option<String>,
    pub platform_timeout: Option<Duration>,
    pub student_dir: Option<PathBuf>,
    pub teacher_dir: Option<PathBuf>,
    pub student_allowed_answers: bool,
}

/// Apply CLI overrides to a configuration
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    let general = &mut config.general;
    if let Some(role) = overrides.role {
        general.role = role;
    }
    if let Some(level) = &overrides.log_level {
        general.log_level = Some(level.clone());
    }
    if let Some(timeout) = overrides.platform_timeout {
        general.platform_timeout = timeout;
    }
    if let Some(dir) = &overrides.student_dir {
        general.student_dir = dir.clone();
    }
    if let Some(dir) = &overrides.teacher_dir {
        general.teacher_dir = dir.clone();
    }
    if overrides.student_allowed_answers {
        if general.role == Role::Student {
            warn!("Students are allowed to see answers; answer sheets will be copied to {:?}", general.student_dir);
        }
        general.student_allowed_answers = true;
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}

/// Configuration for a single scenario run without a file
pub fn single_run(kind: ScenarioKind, seeds: Vec<String>) -> Config {
    Config {
        general: GeneralConfig::default(),
        scenarios: vec![ScenarioConfig {
            kind,
            seeds,
            options: ScenarioOptions::default(),
        }],
    }
}
