//! Run state shared with the cleanup step.
//!
//! While a run materializes credential files it records them in a small JSON
//! state file. `phasebook cleanup` reads that file afterwards, on success and
//! on failure alike, and deletes everything listed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default state file name, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = ".phasebook-state.json";

/// What a run left behind on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Directory the run executed in; relative file entries resolve against it
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Transient files created during the run
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

/// A [`RunState`] backed by a JSON file, saved on every change.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    state: RunState,
}

impl StateStore {
    /// Start a fresh state at `path`, replacing whatever a previous run left.
    pub fn create(path: impl Into<PathBuf>, working_dir: Option<PathBuf>) -> Result<Self> {
        let store = Self {
            path: path.into(),
            state: RunState {
                working_dir,
                files: Vec::new(),
            },
        };
        store.save()?;
        Ok(store)
    }

    /// Load the state at `path`; a missing file is an empty state.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => RunState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, state })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Record a transient file; recording the same path twice is a no-op.
    pub fn record_file(&mut self, file: &Path) -> Result<()> {
        if self.state.files.iter().any(|f| f == file) {
            return Ok(());
        }
        self.state.files.push(file.to_path_buf());
        self.save()
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Delete every file recorded in the state at `state_path`, then the state
/// file itself. Files already gone are skipped. Returns the deleted paths.
pub fn cleanup_transient_files(state_path: &Path) -> Result<Vec<PathBuf>> {
    if !state_path.exists() {
        tracing::warn!(
            "No state file at {}, nothing recorded to clean up",
            state_path.display()
        );
        return Ok(Vec::new());
    }

    let store = StateStore::load(state_path)?;
    let mut removed = Vec::new();

    for file in &store.state.files {
        let path = match &store.state.working_dir {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.clone(),
        };
        if path.exists() {
            tracing::info!("Deleting \"{}\" file", path.display());
            fs::remove_file(&path)?;
            removed.push(path);
        }
    }

    match fs::remove_file(state_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_file_persists_immediately() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join(DEFAULT_STATE_FILE);
        let mut store = StateStore::create(&state_path, Some(dir.path().to_path_buf())).unwrap();

        store.record_file(Path::new(".ansible_private_key")).unwrap();
        store.record_file(Path::new(".ansible_private_key")).unwrap();

        let reloaded = StateStore::load(&state_path).unwrap();
        assert_eq!(reloaded.state().files, vec![PathBuf::from(".ansible_private_key")]);
        assert_eq!(reloaded.state().working_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_create_replaces_stale_state() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join(DEFAULT_STATE_FILE);
        let mut old = StateStore::create(&state_path, None).unwrap();
        old.record_file(Path::new("old")).unwrap();

        StateStore::create(&state_path, None).unwrap();
        assert!(StateStore::load(&state_path).unwrap().state().files.is_empty());
    }

    #[test]
    fn test_cleanup_removes_recorded_files() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join(DEFAULT_STATE_FILE);
        fs::write(dir.path().join(".ansible_inventory"), "host1\n").unwrap();

        let mut store = StateStore::create(&state_path, Some(dir.path().to_path_buf())).unwrap();
        store.record_file(Path::new(".ansible_inventory")).unwrap();
        store.record_file(Path::new(".ansible_known_hosts")).unwrap(); // never written

        let removed = cleanup_transient_files(&state_path).unwrap();
        assert_eq!(removed, vec![dir.path().join(".ansible_inventory")]);
        assert!(!dir.path().join(".ansible_inventory").exists());
        assert!(!state_path.exists());
    }

    #[test]
    fn test_cleanup_without_state_file() {
        let dir = TempDir::new().unwrap();
        let removed = cleanup_transient_files(&dir.path().join(DEFAULT_STATE_FILE)).unwrap();
        assert!(removed.is_empty());
    }
}
