//! Extra command-line options per phase.
//!
//! Options come from two independent sources that are merged into one
//! [`OptionTable`]:
//!
//! - inline grouped text:
//!   ```text
//!   <<setup>>
//!   --forks 10
//!   -e user=%[[ secrets.SSH_USER ]]
//!   <<all>>
//!   -v
//!   ```
//! - a YAML file mapping each group to an `options` list:
//!   ```yaml
//!   setup:
//!     options:
//!       - --forks 10
//!   all:
//!     options: [-v]
//!   ```
//!
//! The group name `all` targets every phase and is modelled as
//! [`OptionGroup::Global`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PhasebookError, Result};
use crate::placeholder::Placeholders;

/// Reserved group name for options that apply to every phase
pub const GLOBAL_GROUP: &str = "all";

/// Which phases a list of options applies to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionGroup {
    /// Options for every phase (`all`)
    Global,
    /// Options for one phase
    Phase(String),
}

impl OptionGroup {
    /// Map a group name from either source onto a group.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name == GLOBAL_GROUP {
            Self::Global
        } else {
            Self::Phase(name.to_string())
        }
    }
}

impl fmt::Display for OptionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str(GLOBAL_GROUP),
            Self::Phase(name) => f.write_str(name),
        }
    }
}

/// Group -> ordered option list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionTable {
    groups: BTreeMap<OptionGroup, Vec<String>>,
}

impl OptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the options of `group`, replacing any earlier list.
    pub fn insert(&mut self, group: OptionGroup, options: Vec<String>) {
        self.groups.insert(group, options);
    }

    pub fn get(&self, group: &OptionGroup) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Options tagged for `phase` only.
    pub fn phase_options(&self, phase: &str) -> &[String] {
        self.get(&OptionGroup::Phase(phase.to_string()))
            .unwrap_or_default()
    }

    /// Options tagged for every phase.
    pub fn global_options(&self) -> &[String] {
        self.get(&OptionGroup::Global).unwrap_or_default()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&OptionGroup, &[String])> {
        self.groups.iter().map(|(g, o)| (g, o.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Merge the inline table with the file table.
    ///
    /// Groups from both sources are kept. A group present in both gets the
    /// inline options followed by the file options, exact duplicates removed
    /// (first occurrence wins). A group from only one source is taken as is.
    pub fn merge(inline: OptionTable, file: OptionTable) -> OptionTable {
        let mut merged = inline;
        for (group, file_options) in file.groups {
            match merged.groups.get_mut(&group) {
                Some(options) => {
                    options.extend(file_options);
                    *options = dedup_preserving_order(std::mem::take(options));
                }
                None => {
                    merged.groups.insert(group, file_options);
                }
            }
        }
        merged
    }

    /// Resolve placeholders in every option of every group.
    pub fn resolve(&self, placeholders: &Placeholders) -> OptionTable {
        let groups = self
            .groups
            .iter()
            .map(|(group, options)| {
                let resolved = options.iter().map(|o| placeholders.resolve(o)).collect();
                (group.clone(), resolved)
            })
            .collect();
        OptionTable { groups }
    }
}

fn dedup_preserving_order(options: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    options
        .into_iter()
        .filter(|option| seen.insert(option.clone()))
        .collect()
}

/// Parse inline grouped text.
///
/// A line of the form `<<NAME>>` opens a group; every following non-blank
/// line, trimmed, is one option until the next marker. Text before the first
/// marker is ignored. A group opened twice keeps only its last block.
pub fn parse_inline(text: &str) -> OptionTable {
    let mut table = OptionTable::new();
    let mut current: Option<(OptionGroup, Vec<String>)> = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(name) = group_marker(line) {
            if let Some((group, options)) = current.take() {
                table.insert(group, options);
            }
            current = Some((OptionGroup::from_name(name), Vec::new()));
            continue;
        }
        if line.is_empty() {
            continue;
        }
        match current.as_mut() {
            Some((_, options)) => options.push(line.to_string()),
            None => tracing::warn!("Ignoring extra option outside of a group: {}", line),
        }
    }
    if let Some((group, options)) = current {
        table.insert(group, options);
    }
    table
}

fn group_marker(line: &str) -> Option<&str> {
    let name = line.strip_prefix("<<")?.strip_suffix(">>")?;
    if name.trim().is_empty() {
        None
    } else {
        Some(name)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileGroup {
    #[serde(default)]
    options: Vec<String>,
}

/// Parse a structured options document (YAML).
pub fn parse_options_document(content: &str) -> Result<OptionTable> {
    if content.trim().is_empty() {
        return Ok(OptionTable::new());
    }
    let document: Option<BTreeMap<String, Option<FileGroup>>> =
        serde_yaml::from_str(content).map_err(|e| PhasebookError::options_parse(e.to_string()))?;

    let mut table = OptionTable::new();
    for (name, group) in document.unwrap_or_default() {
        table.insert(OptionGroup::from_name(&name), group.unwrap_or_default().options);
    }
    Ok(table)
}

/// Read and parse the structured options file at `path`.
pub fn parse_options_file(path: &Path) -> Result<OptionTable> {
    let content = fs::read_to_string(path).map_err(|e| {
        PhasebookError::options_parse(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_options_document(&content)
}

/// Build the resolved option table for one run.
///
/// Either source may be absent; with neither the table is empty.
pub fn load_option_table(
    inline: Option<&str>,
    file: Option<&Path>,
    placeholders: &Placeholders,
) -> Result<OptionTable> {
    let inline_table = inline.map(parse_inline).unwrap_or_default();
    let file_table = match file {
        Some(path) => parse_options_file(path)?,
        None => OptionTable::new(),
    };
    let table = OptionTable::merge(inline_table, file_table).resolve(placeholders);
    for (group, options) in table.groups() {
        tracing::debug!("Extra options for {}: {} entries", group, options.len());
    }
    Ok(table)
}
