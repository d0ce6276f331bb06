//! phasebook library
//!
//! Runs a sequence of Ansible playbooks, one per phase directory, in a
//! declared order. The pieces compose as follows:
//!
//! - [`phase`] and [`validate`] decide which phases exist and whether the
//!   declared order is admissible
//! - [`options`] and [`placeholder`] build the resolved extra-option table
//! - [`command`] turns a phase into an `ansible-playbook` command line
//! - [`runner`] executes phases in order through an [`executor::ProcessRunner`]
//! - [`pipeline`] ties them together for one run

pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod options;
pub mod outputs;
pub mod phase;
pub mod pipeline;
pub mod placeholder;
pub mod process_guard;
pub mod requirements;
pub mod runner;
pub mod state;
pub mod validate;

// Re-export main types for convenience
pub use command::{
    CommandBuilder, ConnectionSettings, FileMaterializer, PlannedFiles, PreparedCommand,
    TransientFile, WorkdirMaterializer,
};
pub use config::RunConfig;
pub use error::{PhasebookError, Result};
pub use executor::{DryRunner, ExecError, OutputChunk, ProcessRunner, ShellRunner};
pub use options::{OptionGroup, OptionTable};
pub use phase::{PhaseOrder, discover_phases, split_list};
pub use pipeline::{PreparedRun, prepare_run};
pub use placeholder::Placeholders;
pub use runner::{PhaseRunner, RunReport, RunResults};
pub use state::{RunState, StateStore, cleanup_transient_files};
pub use validate::{ValidationPolicy, validate_phase_order};
