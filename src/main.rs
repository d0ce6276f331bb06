//! phasebook - main entry point

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use phasebook::cli::{Cli, Commands, RunInputs};
use phasebook::outputs::{GITHUB_OUTPUT_ENV, publish_results};
use phasebook::{
    DryRunner, PlannedFiles, RunConfig, ShellRunner, StateStore, WorkdirMaterializer,
    cleanup_transient_files, prepare_run, process_guard,
};

/// Initialize logging on stderr; stdout carries the results.
fn init_logger() {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logger();
    debug!("phasebook starting up");

    // Stop the running playbook if we receive SIGINT/SIGTERM/SIGHUP
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let mut cli = Cli::parse_args();
    match std::env::current_dir() {
        Ok(launch_dir) => cli.command.anchor_outputs(&launch_dir),
        Err(e) => warn!("Failed to read current directory: {}", e),
    }

    let outcome = match cli.command {
        Commands::Run {
            inputs,
            results_file,
            state_file,
        } => run_phases(&inputs, results_file.as_deref(), &state_file, cli.dry_run),
        Commands::Validate { inputs } => validate_only(&inputs),
        Commands::Cleanup {
            config,
            ansible_directory,
            state_file,
        } => cleanup(config.as_deref(), ansible_directory, &state_file),
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(inputs: &RunInputs) -> Result<RunConfig> {
    match &inputs.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            RunConfig::load_from_file(path)
        }
        None => Ok(inputs.to_config()),
    }
}

/// Change into the configured working directory and return it.
fn enter_working_dir(config: &RunConfig) -> Result<PathBuf> {
    let current = std::env::current_dir().context("Failed to read current directory")?;
    let Some(dir) = &config.working_dir else {
        return Ok(current);
    };

    let target = dir
        .canonicalize()
        .with_context(|| format!("Working directory {} not found", dir.display()))?;
    if target != current {
        info!("Changing directory to {}", dir.display());
        std::env::set_current_dir(&target)
            .with_context(|| format!("Failed to change directory to {}", dir.display()))?;
    }
    Ok(target)
}

fn run_phases(
    inputs: &RunInputs,
    results_file: Option<&Path>,
    state_file: &Path,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(inputs)?;
    let working_dir = enter_working_dir(&config)?;

    // Captured once; placeholders and PATH resolve against this snapshot
    let env: HashMap<String, String> = std::env::vars().collect();
    let step_output = env
        .get(GITHUB_OUTPUT_ENV)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    let prepared = prepare_run(&config, env)?;
    info!(
        "Running {} phases: {}",
        prepared.order.len(),
        prepared.order.phases().join(", ")
    );

    let report = if dry_run {
        prepared.execute(&mut PlannedFiles, &mut DryRunner)?
    } else {
        let state_path = working_dir.join(state_file);
        let state = StateStore::create(state_path, Some(working_dir))?;
        let mut files = WorkdirMaterializer::in_current_dir().with_state(state);
        prepared.execute(&mut files, &mut ShellRunner::new())?
    };

    // Completed phases are published even when a later phase failed
    publish_results(&report.results, results_file, step_output.as_deref())?;
    report.into_result()?;
    Ok(())
}

fn validate_only(inputs: &RunInputs) -> Result<()> {
    let config = load_config(inputs)?;
    enter_working_dir(&config)?;
    let prepared = prepare_run(&config, std::env::vars().collect())?;
    println!(
        "✓ Execution order matches the phase directories: {}",
        prepared.order.phases().join(", ")
    );
    Ok(())
}

fn cleanup(
    config: Option<&Path>,
    ansible_directory: Option<PathBuf>,
    state_file: &Path,
) -> Result<()> {
    let config = match config {
        Some(path) => RunConfig::load_from_file(path)?,
        None => RunConfig {
            working_dir: ansible_directory,
            ..Default::default()
        },
    };
    let state_path = config.state_file_path(state_file);
    let removed = cleanup_transient_files(&state_path)
        .with_context(|| format!("Failed to clean up using {}", state_path.display()))?;
    info!("Removed {} transient files", removed.len());
    Ok(())
}
