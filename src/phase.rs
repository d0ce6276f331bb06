//! Phase discovery.
//!
//! A phase is a subdirectory of the playbook directory holding a `main.yml`
//! entrypoint. The caller declares the order phases run in as a
//! comma-separated list; this module turns that list into a [`PhaseOrder`]
//! and lists the phase directories that actually exist.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{PhasebookError, Result};

/// Entrypoint file name inside every phase directory
pub const PLAYBOOK_ENTRYPOINT: &str = "main.yml";

/// Split a comma-separated list, trimming every element.
///
/// An empty (or whitespace-only) string yields an empty list. Empty elements
/// between commas are kept so that a stray comma shows up during validation
/// instead of silently vanishing.
pub fn split_list(list: &str) -> Vec<String> {
    if list.trim().is_empty() {
        return Vec::new();
    }
    list.split(',').map(|item| item.trim().to_string()).collect()
}

/// The caller-declared order in which phases run.
///
/// Duplicates are preserved: a phase listed twice runs twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOrder(Vec<String>);

impl PhaseOrder {
    /// Parse an execution order declaration like `"setup, run, teardown"`.
    pub fn parse(declaration: &str) -> Self {
        Self(split_list(declaration))
    }

    pub fn phases(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// List the phase directories under `root`.
///
/// Returns the names of the immediate subdirectories of `root`, minus any
/// name in `exclude`. Regular files are ignored and there is no recursion.
pub fn discover_phases(root: &Path, exclude: &[String]) -> Result<BTreeSet<String>> {
    tracing::info!("Extracting phase directories from {}", root.display());

    let metadata = fs::metadata(root).map_err(|e| unlistable_root(root, e))?;
    if !metadata.is_dir() {
        return Err(PhasebookError::NotADirectory(root.to_path_buf()));
    }

    let mut phases = BTreeSet::new();
    for entry in fs::read_dir(root).map_err(|e| unlistable_root(root, e))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if exclude.iter().any(|excluded| excluded == &name) {
            tracing::debug!("Excluding directory {}", name);
            continue;
        }
        phases.insert(name);
    }

    tracing::debug!("Discovered phases: {:?}", phases);
    Ok(phases)
}

/// Any failure to reach or list the root means there is no playbook directory.
fn unlistable_root(root: &Path, e: std::io::Error) -> PhasebookError {
    tracing::debug!("Cannot list {}: {}", root.display(), e);
    match e.kind() {
        ErrorKind::NotADirectory => PhasebookError::NotADirectory(root.to_path_buf()),
        _ => PhasebookError::PathNotFound(root.to_path_buf()),
    }
}

/// Path of the playbook that backs `phase`.
pub fn playbook_path(playbook_dir: &Path, phase: &str) -> PathBuf {
    playbook_dir.join(phase).join(PLAYBOOK_ENTRYPOINT)
}
