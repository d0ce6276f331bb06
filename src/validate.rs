//! Phase order validation.
//!
//! Compares the declared [`PhaseOrder`] against the discovered phase
//! directories before anything runs. Which comparison applies is chosen
//! explicitly through [`ValidationPolicy`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{PhasebookError, Result};
use crate::phase::PhaseOrder;

/// How strictly the declared order must match the phase directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValidationPolicy {
    /// Every declared phase has a directory and every directory is declared.
    /// Compared as sorted lists, so a phase declared twice fails.
    #[default]
    Strict,
    /// Every declared phase has a directory; undeclared directories never run.
    Subset,
}

/// Check the declared order against the discovered phases.
///
/// Returns `PhaseMismatch` naming the offending phases on failure.
pub fn validate_phase_order(
    order: &PhaseOrder,
    discovered: &BTreeSet<String>,
    policy: ValidationPolicy,
) -> Result<()> {
    if is_admissible(order.phases(), discovered, policy) {
        tracing::debug!("Phase order {:?} accepted ({})", order.phases(), policy);
        return Ok(());
    }

    let missing: Vec<&str> = order
        .iter()
        .filter(|phase| !discovered.contains(*phase))
        .collect();
    let undeclared: Vec<&str> = discovered
        .iter()
        .map(String::as_str)
        .filter(|dir| !order.iter().any(|phase| phase == *dir))
        .collect();

    let mut details = Vec::new();
    if !missing.is_empty() {
        details.push(format!("no directory for [{}]", missing.join(", ")));
    }
    if policy == ValidationPolicy::Strict && !undeclared.is_empty() {
        details.push(format!("undeclared directories [{}]", undeclared.join(", ")));
    }
    if details.is_empty() {
        details.push(format!(
            "declared {} phases but found {} directories",
            order.len(),
            discovered.len()
        ));
    }

    Err(PhasebookError::phase_mismatch(details.join("; ")))
}

/// Pure admissibility check behind [`validate_phase_order`].
pub fn is_admissible(
    declared: &[String],
    discovered: &BTreeSet<String>,
    policy: ValidationPolicy,
) -> bool {
    match policy {
        ValidationPolicy::Strict => {
            if declared.len() != discovered.len() {
                return false;
            }
            let mut sorted = declared.to_vec();
            sorted.sort();
            sorted.iter().eq(discovered.iter())
        }
        ValidationPolicy::Subset => declared.iter().all(|phase| discovered.contains(phase)),
    }
}
