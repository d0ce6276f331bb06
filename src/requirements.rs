//! Installing Ansible Galaxy requirements before the first phase.
//!
//! A requirements file is either a plain list (legacy role format) or a
//! mapping with `roles` and/or `collections` sections; each shape needs a
//! different `ansible-galaxy` invocation.

use std::fs;
use std::path::Path;

use serde_yaml::Value;

use crate::command::PreparedCommand;
use crate::error::{PhasebookError, Result};
use crate::executor::ProcessRunner;

/// Galaxy CLI binary
pub const GALAXY_EXECUTABLE: &str = "ansible-galaxy";

/// The `ansible-galaxy` commands needed for a requirements document.
pub fn galaxy_commands(content: &str, requirements: &Path) -> Result<Vec<PreparedCommand>> {
    let document: Value = serde_yaml::from_str(content).map_err(|e| {
        PhasebookError::config(format!(
            "invalid requirements file {}: {}",
            requirements.display(),
            e
        ))
    })?;
    let file = requirements.display();

    let commands = match &document {
        Value::Sequence(_) => vec![format!("{GALAXY_EXECUTABLE} install -r {file}")],
        Value::Mapping(sections) => {
            let mut commands = Vec::new();
            if sections.get("roles").is_some_and(is_present) {
                commands.push(format!("{GALAXY_EXECUTABLE} role install -r {file}"));
            }
            if sections.get("collections").is_some_and(is_present) {
                commands.push(format!("{GALAXY_EXECUTABLE} collection install -r {file}"));
            }
            commands
        }
        _ => Vec::new(),
    };

    Ok(commands.into_iter().map(PreparedCommand::new).collect())
}

fn is_present(section: &Value) -> bool {
    match section {
        Value::Null | Value::Bool(false) => false,
        Value::Sequence(items) => !items.is_empty(),
        _ => true,
    }
}

/// Read `requirements` and run the matching install commands.
pub fn install_requirements(requirements: &Path, processes: &mut dyn ProcessRunner) -> Result<()> {
    let content = fs::read_to_string(requirements).map_err(|e| {
        PhasebookError::config(format!(
            "cannot read requirements file {}: {}",
            requirements.display(),
            e
        ))
    })?;

    for command in galaxy_commands(&content, requirements)? {
        tracing::info!("Installing requirements: {}", command);
        processes
            .run("requirements", &command, &mut |_| {})
            .map_err(|e| PhasebookError::phase_execution("requirements", e.to_string()))?;
    }
    Ok(())
}
