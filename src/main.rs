use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;

use segnet::config::{Config, Role};
use segnet::config_loader::{self, CliOverrides};
use segnet::output::DirectorySink;
use segnet::platform::{RecordingPlatform, VsctlSwitchControl};
use segnet::scenario::{RunSettings, ScenarioKind, Session, RANDOM_SEED};

/// Generate reproducible network security exercises
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the batch configuration YAML file
    #[arg(short, long, conflicts_with = "scenario")]
    config: Option<PathBuf>,

    /// Run a single scenario instead of a configured batch
    #[arg(short, long, value_enum)]
    scenario: Option<ScenarioKind>,

    /// Identifier(s) to seed the scenario with; "random" for an unseeded run
    #[arg(long, requires = "scenario", default_value = RANDOM_SEED)]
    seed: Vec<String>,

    /// List the available scenarios and exit
    #[arg(long)]
    list: bool,

    /// Log filter, overriding the configuration and role default
    #[arg(long)]
    log_level: Option<String>,

    /// Generate teacher material (answers, info logging)
    #[arg(long, conflicts_with = "developer")]
    teacher: bool,

    /// Developer mode: self-check commands and debug logging
    #[arg(long)]
    developer: bool,

    /// Directory for student task sheets
    #[arg(long)]
    student_dir: Option<PathBuf>,

    /// Directory for teacher answer sheets and topologies
    #[arg(long)]
    teacher_dir: Option<PathBuf>,

    /// Copy answer sheets into the student directory
    #[arg(long)]
    student_answers: bool,

    /// Bound on every platform call, e.g. "30s"
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Push VLAN settings to Open vSwitch through this ovs-vsctl binary
    #[arg(long)]
    vsctl: Option<PathBuf>,
}

impl Args {
    fn role(&self) -> Option<Role> {
        if self.developer {
            Some(Role::Developer)
        } else if self.teacher {
            Some(Role::Teacher)
        } else {
            None
        }
    }

    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            role: self.role(),
            log_level: self.log_level.clone(),
            platform_timeout: self.timeout,
            student_dir: self.student_dir.clone(),
            teacher_dir: self.teacher_dir.clone(),
            student_allowed_answers: self.student_answers,
        }
    }
}

fn list_scenarios() {
    for kind in ScenarioKind::all() {
        let value = kind
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();
        println!("{:>3}  {:<22} {}", kind.weight(), value, kind.name());
    }
}

fn load(args: &Args) -> Result<Config> {
    let mut config = match (&args.config, args.scenario) {
        (Some(path), _) => config_loader::load_config(path)?,
        (None, Some(kind)) => config_loader::single_run(kind, args.seed.clone()),
        (None, None) => bail!("either --config or --scenario is required"),
    };
    config_loader::apply_overrides(&mut config, &args.overrides())?;
    Ok(config)
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    if args.list {
        list_scenarios();
        return Ok(());
    }

    let config = load(&args)?;

    env_logger::Builder::from_env(Env::default().default_filter_or(config.general.log_level())).init();

    let general = &config.general;
    info!("Starting segnet batch of {} run(s)", config.run_count());
    info!("Student directory: {:?}", general.student_dir);
    info!("Teacher directory: {:?}", general.teacher_dir);

    let mut platform = match &args.vsctl {
        Some(program) => {
            info!("Forwarding VLAN settings to {:?}", program);
            RecordingPlatform::forwarding_to(Box::new(VsctlSwitchControl::with_program(program)))
        }
        None => RecordingPlatform::new(),
    };
    let mut sink = DirectorySink {
        student_dir: general.student_dir.clone(),
        teacher_dir: general.teacher_dir.clone(),
        student_allowed_answers: general.student_allowed_answers,
        static_task_document: general.static_task_document,
    };
    let settings = RunSettings {
        timeout: general.platform_timeout,
        developer: general.role.is_developer(),
    };

    // One session for the whole batch so no two runs share address space
    let mut session = Session::new();
    for scenario in &config.scenarios {
        for seed in &scenario.seeds {
            let id = (seed != RANDOM_SEED).then_some(seed.as_str());
            let outcome = scenario
                .kind
                .run(&scenario.options, &mut session, id, &mut platform, &mut sink, &settings)
                .wrap_err_with(|| format!("{} failed for {}", scenario.kind, seed))
                .inspect_err(|e| error!("{:#}", e))?;

            info!(
                "Generated {} for {}: {} switch(es), {} host(s), {} document(s)",
                outcome.name,
                outcome.seed,
                outcome.plan.switches().len(),
                outcome.plan.hosts().len(),
                outcome.persisted.len()
            );
            for network in outcome.plan.networks() {
                println!("{}\t{}\t{}", outcome.name, outcome.seed, network);
            }
        }
    }

    info!("Batch completed successfully");
    Ok(())
}
