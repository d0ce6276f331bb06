//! Run configuration.
//!
//! A [`RunConfig`] holds every input of one run. It is built from command
//! line flags (each with an `INPUT_*` environment fallback, see `cli`) or
//! loaded from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::command::ConnectionSettings;
use crate::error::{PhasebookError, Result};
use crate::phase::{PhaseOrder, split_list};
use crate::validate::ValidationPolicy;

/// All inputs of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory to run from; playbook and file paths are relative to it
    pub working_dir: Option<PathBuf>,
    /// Directory whose subdirectories are the phases
    pub playbook_dir: Option<PathBuf>,
    /// Comma-separated phase order, e.g. `"setup, run, teardown"`
    pub execution_order: String,
    /// Comma-separated directory names that are not phases
    pub exclude_dirs: String,
    /// Ansible Galaxy requirements file installed before the first phase
    pub requirements: Option<PathBuf>,
    pub private_key: Option<String>,
    pub inventory: Option<String>,
    pub known_hosts: Option<String>,
    /// Run playbooks through sudo
    pub sudo: bool,
    /// Inline grouped extra options (`<<group>>` blocks)
    pub extra_options: Option<String>,
    /// YAML extra options file
    pub extra_options_file: Option<PathBuf>,
    /// JSON-encoded secrets object for `%[[ secrets.KEY ]]`
    pub secrets: Option<String>,
    pub validation_policy: ValidationPolicy,
}

impl RunConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;
        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;
        Ok(config)
    }

    /// Check that the required inputs are present.
    pub fn validate(&self) -> Result<()> {
        if self.playbook_dir.as_ref().is_none_or(|d| d.as_os_str().is_empty()) {
            return Err(PhasebookError::config("playbook directory is required"));
        }
        if self.execution_order.trim().is_empty() {
            return Err(PhasebookError::config("execution order is required"));
        }
        Ok(())
    }

    /// The playbook directory; call [`RunConfig::validate`] first.
    pub fn playbook_dir(&self) -> Result<&Path> {
        self.playbook_dir
            .as_deref()
            .ok_or_else(|| PhasebookError::config("playbook directory is required"))
    }

    pub fn phase_order(&self) -> PhaseOrder {
        PhaseOrder::parse(&self.execution_order)
    }

    pub fn exclusions(&self) -> Vec<String> {
        split_list(&self.exclude_dirs)
    }

    /// Where a run with this config keeps its state file. A relative
    /// `state_file` lives in the working directory.
    pub fn state_file_path(&self, state_file: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) => dir.join(state_file),
            None => state_file.to_path_buf(),
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            private_key: self.private_key.clone(),
            inventory: self.inventory.clone(),
            known_hosts: self.known_hosts.clone(),
            privileged: self.sudo,
        }
    }
}

/// Interpret a privilege flag input: only the exact string `true` enables it.
pub fn parse_flag(value: &str) -> bool {
    value == "true"
}

/// Treat empty inputs as absent; CI runners pass unset inputs as `""`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample() -> RunConfig {
        RunConfig {
            playbook_dir: Some(PathBuf::from("playbooks")),
            execution_order: "setup, run".into(),
            exclude_dirs: "roles".into(),
            sudo: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_requires_playbook_dir() {
        let config = RunConfig {
            playbook_dir: None,
            ..sample()
        };
        assert!(matches!(config.validate(), Err(PhasebookError::Config(_))));
    }

    #[test]
    fn test_validate_requires_execution_order() {
        let config = RunConfig {
            execution_order: "  ".into(),
            ..sample()
        };
        assert!(matches!(config.validate(), Err(PhasebookError::Config(_))));
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        let config = sample();
        config.save_to_file(file.path()).unwrap();
        assert_eq!(RunConfig::load_from_file(file.path()).unwrap(), config);
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            r#"{"playbook_dir": "pb", "execution_order": "a", "validation_policy": "subset"}"#,
        )
        .unwrap();
        let config = RunConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.validation_policy, ValidationPolicy::Subset);
        assert!(!config.sudo);
        assert!(config.extra_options.is_none());
    }

    #[test]
    fn test_load_invalid_json() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "{ not json").unwrap();
        assert!(RunConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_derived_views() {
        let config = sample();
        assert_eq!(config.phase_order().phases(), ["setup", "run"]);
        assert_eq!(config.exclusions(), vec!["roles"]);
        assert!(config.connection_settings().privileged);
    }

    #[test]
    fn test_state_file_path_follows_working_dir() {
        let config = RunConfig {
            working_dir: Some(PathBuf::from("ansible")),
            ..sample()
        };
        assert_eq!(
            config.state_file_path(Path::new(".phasebook-state.json")),
            Path::new("ansible/.phasebook-state.json")
        );
        assert_eq!(
            config.state_file_path(Path::new("/tmp/state.json")),
            Path::new("/tmp/state.json")
        );
        assert_eq!(
            sample().state_file_path(Path::new("state.json")),
            Path::new("state.json")
        );
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(!parse_flag("True"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag(""));
    }
}
