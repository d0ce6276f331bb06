//! Building the `ansible-playbook` invocation for one phase.
//!
//! The result is a single command line plus the environment it needs. Option
//! strings are concatenated verbatim with single spaces; nothing is shell
//! escaped, so an option containing spaces or shell metacharacters reaches
//! the shell exactly as written.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::options::OptionTable;
use crate::state::StateStore;

/// Playbook runner binary
pub const PLAYBOOK_EXECUTABLE: &str = "ansible-playbook";
/// Privilege escalation binary
pub const ESCALATION_EXECUTABLE: &str = "sudo";
/// Environment switch for SSH host key checking
pub const HOST_KEY_CHECKING_ENV: &str = "ANSIBLE_HOST_KEY_CHECKING";

/// Credential or config material written to disk for the duration of a run.
///
/// Each kind has a fixed file name so a later cleanup, or the next run after
/// a crash, finds and overwrites the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientFile {
    PrivateKey,
    Inventory,
    KnownHosts,
}

impl TransientFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::PrivateKey => ".ansible_private_key",
            Self::Inventory => ".ansible_inventory",
            Self::KnownHosts => ".ansible_known_hosts",
        }
    }
}

/// Writes transient files and reports the path to put on the command line.
pub trait FileMaterializer {
    fn materialize(&mut self, kind: TransientFile, content: &str) -> Result<PathBuf>;
}

/// Writes transient files into a directory with mode 0600.
///
/// Existing files are truncated, never appended to. Every file written is
/// recorded in the state store when one is attached.
#[derive(Debug)]
pub struct WorkdirMaterializer {
    dir: PathBuf,
    state: Option<StateStore>,
}

impl WorkdirMaterializer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state: None,
        }
    }

    /// Write into the current working directory using bare file names.
    pub fn in_current_dir() -> Self {
        Self::new(PathBuf::new())
    }

    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = Some(state);
        self
    }
}

impl FileMaterializer for WorkdirMaterializer {
    fn materialize(&mut self, kind: TransientFile, content: &str) -> Result<PathBuf> {
        let path = self.dir.join(kind.file_name());
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)?;
        // mode() only applies on creation; tighten a stale file left by a crash
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        file.write_all(content.as_bytes())?;
        if !content.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        tracing::debug!("Wrote {}", path.display());

        if let Some(state) = self.state.as_mut() {
            state.record_file(&path)?;
        }
        Ok(path)
    }
}

/// Names transient files without writing them, for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlannedFiles;

impl FileMaterializer for PlannedFiles {
    fn materialize(&mut self, kind: TransientFile, _content: &str) -> Result<PathBuf> {
        tracing::info!("[DRY RUN] Would write {}", kind.file_name());
        Ok(PathBuf::from(kind.file_name()))
    }
}

/// SSH and privilege settings shared by every phase of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub private_key: Option<String>,
    pub inventory: Option<String>,
    pub known_hosts: Option<String>,
    pub privileged: bool,
}

/// A fully built command line and the environment it runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub line: String,
    pub env: Vec<(String, String)>,
}

impl PreparedCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            env: Vec::new(),
        }
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for PreparedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Assembles per-phase commands from the run-wide settings and options.
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    settings: &'a ConnectionSettings,
    options: &'a OptionTable,
    path_env: String,
}

impl<'a> CommandBuilder<'a> {
    /// `path_env` is the caller's `PATH`, carried across the privilege
    /// boundary when escalation is requested.
    pub fn new(
        settings: &'a ConnectionSettings,
        options: &'a OptionTable,
        path_env: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            options,
            path_env: path_env.into(),
        }
    }

    /// Build the command that runs `playbook` for `phase`.
    pub fn build(
        &self,
        playbook: &Path,
        phase: &str,
        files: &mut dyn FileMaterializer,
    ) -> Result<PreparedCommand> {
        let mut components = vec![
            PLAYBOOK_EXECUTABLE.to_string(),
            playbook.display().to_string(),
        ];

        if let Some(key) = non_empty(&self.settings.private_key) {
            let file = files.materialize(TransientFile::PrivateKey, key)?;
            components.push("--private-key".to_string());
            components.push(file.display().to_string());
        }

        if let Some(inventory) = non_empty(&self.settings.inventory) {
            let file = files.materialize(TransientFile::Inventory, inventory)?;
            components.push("--inventory".to_string());
            components.push(file.display().to_string());
        }

        let host_key_checking = match non_empty(&self.settings.known_hosts) {
            Some(known_hosts) => {
                let file = files.materialize(TransientFile::KnownHosts, known_hosts)?;
                components.push(format!(
                    "--ssh-common-args=\"-o UserKnownHostsFile={}\"",
                    file.display()
                ));
                "True"
            }
            None => "False",
        };

        let phase_options = self.options.phase_options(phase);
        if !phase_options.is_empty() {
            tracing::info!(
                "Appending {} extra options for phase {}",
                phase_options.len(),
                phase
            );
            components.extend(phase_options.iter().cloned());
        }
        components.extend(self.options.global_options().iter().cloned());

        if self.settings.privileged {
            let mut escalated = vec![
                ESCALATION_EXECUTABLE.to_string(),
                "-E".to_string(),
                "env".to_string(),
                format!("PATH={}", self.path_env),
            ];
            escalated.append(&mut components);
            components = escalated;
        }

        Ok(PreparedCommand {
            line: components.join(" "),
            env: vec![(
                HOST_KEY_CHECKING_ENV.to_string(),
                host_key_checking.to_string(),
            )],
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
