use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{RunConfig, non_empty, parse_flag};
use crate::state::DEFAULT_STATE_FILE;
use crate::validate::ValidationPolicy;

/// phasebook - run Ansible playbook phases in a declared order
#[derive(Parser)]
#[command(name = "phasebook")]
#[command(about = "Run a sequence of Ansible playbook phases in a declared order")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: print the commands each phase would run without
    /// writing credential files or starting any process.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the inputs and run every phase in order
    Run {
        #[command(flatten)]
        inputs: RunInputs,

        /// Also write the JSON results to this file
        #[arg(long)]
        results_file: Option<PathBuf>,

        /// Where to record transient files for `cleanup`
        #[arg(long, default_value = DEFAULT_STATE_FILE)]
        state_file: PathBuf,
    },
    /// Check the execution order against the phase directories and exit
    Validate {
        #[command(flatten)]
        inputs: RunInputs,
    },
    /// Delete the transient files recorded by a previous run
    Cleanup {
        /// Config file the run was started with; its working directory
        /// locates the state file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Directory the run executed in
        #[arg(long, env = "INPUT_ANSIBLE_DIRECTORY")]
        ansible_directory: Option<PathBuf>,

        /// State file written by `run`, relative to the ansible directory
        #[arg(long, default_value = DEFAULT_STATE_FILE)]
        state_file: PathBuf,
    },
}

/// Run inputs. Every flag falls back to the `INPUT_<NAME>` environment
/// variable a CI runner sets for a step input of the same name.
#[derive(Args, Debug, Clone, Default)]
pub struct RunInputs {
    /// Load all inputs from a JSON config file instead of flags
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Directory to run from
    #[arg(long, env = "INPUT_ANSIBLE_DIRECTORY")]
    pub ansible_directory: Option<PathBuf>,

    /// Directory whose subdirectories are the phases
    #[arg(long, env = "INPUT_PLAYBOOK_DIRECTORY")]
    pub playbook_directory: Option<PathBuf>,

    /// Comma-separated phase order (e.g. "setup, run, teardown")
    #[arg(long, env = "INPUT_EXECUTION_ORDER")]
    pub execution_order: Option<String>,

    /// Comma-separated subdirectories that are not phases
    #[arg(long, env = "INPUT_EXCLUDE_DIRS")]
    pub exclude_dirs: Option<String>,

    /// Ansible Galaxy requirements file
    #[arg(long, env = "INPUT_REQUIREMENTS")]
    pub requirements: Option<PathBuf>,

    /// SSH private key material
    #[arg(long, env = "INPUT_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Inventory file content
    #[arg(long, env = "INPUT_INVENTORY_FILE_PATH", hide_env_values = true)]
    pub inventory: Option<String>,

    /// known_hosts content; enables strict host key checking
    #[arg(long, env = "INPUT_KNOWN_HOSTS", hide_env_values = true)]
    pub known_hosts: Option<String>,

    /// Run playbooks through sudo ("true" to enable)
    #[arg(long, env = "INPUT_SUDO")]
    pub sudo: Option<String>,

    /// Inline extra options in `<<group>>` blocks
    #[arg(long, env = "INPUT_EXTRA_OPTIONS")]
    pub extra_options: Option<String>,

    /// YAML file of extra options per group
    #[arg(long, env = "INPUT_EXTRA_OPTIONS_FILE")]
    pub extra_options_file: Option<PathBuf>,

    /// JSON object of secrets for `%[[ secrets.KEY ]]`
    #[arg(long, env = "INPUT_SECRETS", hide_env_values = true)]
    pub secrets: Option<String>,

    /// How the execution order must match the phase directories
    #[arg(long, env = "INPUT_VALIDATION_POLICY", default_value_t = ValidationPolicy::Strict)]
    pub validation_policy: ValidationPolicy,
}

impl RunInputs {
    /// Assemble the run configuration from flags. A `--config` file is
    /// loaded by the caller instead.
    pub fn to_config(&self) -> RunConfig {
        let path = |p: &Option<PathBuf>| p.clone().filter(|p| !p.as_os_str().is_empty());
        RunConfig {
            working_dir: path(&self.ansible_directory),
            playbook_dir: path(&self.playbook_directory),
            execution_order: self.execution_order.clone().unwrap_or_default(),
            exclude_dirs: self.exclude_dirs.clone().unwrap_or_default(),
            requirements: path(&self.requirements),
            private_key: non_empty(self.private_key.clone()),
            inventory: non_empty(self.inventory.clone()),
            known_hosts: non_empty(self.known_hosts.clone()),
            sudo: self.sudo.as_deref().is_some_and(parse_flag),
            extra_options: non_empty(self.extra_options.clone()),
            extra_options_file: path(&self.extra_options_file),
            secrets: non_empty(self.secrets.clone()),
            validation_policy: self.validation_policy,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

impl Commands {
    /// Resolve output paths given relative to the directory phasebook was
    /// started from, before a run changes into its working directory.
    pub fn anchor_outputs(&mut self, launch_dir: &Path) {
        if let Commands::Run {
            results_file: Some(path),
            ..
        } = self
        {
            *path = launch_dir.join(&*path);
        }
    }
}
