//! One complete run, from inputs to results.
//!
//! Everything that can be checked without side effects (required inputs,
//! secrets, phase directories, option sources) is checked in
//! [`prepare_run`]. Only a [`PreparedRun`] installs requirements, writes
//! credential files or starts processes.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::command::{CommandBuilder, ConnectionSettings, FileMaterializer};
use crate::config::RunConfig;
use crate::error::Result;
use crate::executor::ProcessRunner;
use crate::options::{OptionTable, load_option_table};
use crate::phase::{PhaseOrder, discover_phases};
use crate::placeholder::{Placeholders, parse_secrets};
use crate::requirements::install_requirements;
use crate::runner::{PhaseRunner, RunReport};
use crate::validate::validate_phase_order;

/// A validated run, ready to execute
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub order: PhaseOrder,
    pub playbook_dir: PathBuf,
    pub requirements: Option<PathBuf>,
    pub settings: ConnectionSettings,
    pub options: OptionTable,
    /// `PATH` captured at start, carried across privilege escalation
    pub path_env: String,
}

/// Validate `config` against the filesystem and resolve its options.
///
/// `env` is the environment snapshot placeholders resolve against.
pub fn prepare_run(config: &RunConfig, env: HashMap<String, String>) -> Result<PreparedRun> {
    config.validate()?;
    let secrets = parse_secrets(config.secrets.as_deref().unwrap_or_default())?;

    let playbook_dir = config.playbook_dir()?.to_path_buf();
    let order = config.phase_order();
    let discovered = discover_phases(&playbook_dir, &config.exclusions())?;
    validate_phase_order(&order, &discovered, config.validation_policy)?;

    let path_env = env.get("PATH").cloned().unwrap_or_default();
    let placeholders = Placeholders::new(env, secrets);
    let options = load_option_table(
        config.extra_options.as_deref(),
        config.extra_options_file.as_deref(),
        &placeholders,
    )?;

    Ok(PreparedRun {
        order,
        playbook_dir,
        requirements: config.requirements.clone(),
        settings: config.connection_settings(),
        options,
        path_env,
    })
}

impl PreparedRun {
    /// Install requirements, then run every phase.
    ///
    /// Errors that stop the run before the first phase are returned as `Err`;
    /// a phase failure is reported inside the [`RunReport`].
    pub fn execute(
        &self,
        files: &mut dyn FileMaterializer,
        processes: &mut dyn ProcessRunner,
    ) -> Result<RunReport> {
        if let Some(requirements) = &self.requirements {
            install_requirements(requirements, processes)?;
        }

        let builder = CommandBuilder::new(&self.settings, &self.options, self.path_env.clone());
        let runner = PhaseRunner::new(&self.playbook_dir, builder);
        Ok(runner.run(&self.order, files, processes))
    }
}
