//! Publishing the `results` output.
//!
//! Results always go to stdout as JSON. They can also be written to a file,
//! and when running as a CI step they are appended to the file named by
//! `GITHUB_OUTPUT` in its multi-line `name<<DELIMITER` form.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::runner::RunResults;

/// Name of the output holding the run results
pub const RESULTS_OUTPUT: &str = "results";
/// Environment variable naming the CI step output file
pub const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";

/// Append `name=value` to a CI output file using a delimiter block.
pub fn append_step_output(output_file: &Path, name: &str, value: &str) -> Result<()> {
    let delimiter = unique_delimiter(value);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_file)?;
    writeln!(file, "{name}<<{delimiter}")?;
    writeln!(file, "{value}")?;
    writeln!(file, "{delimiter}")?;
    Ok(())
}

fn unique_delimiter(value: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut delimiter = format!("phasebook_{}_{}", std::process::id(), nanos);
    while value.contains(&delimiter) {
        delimiter.push('_');
    }
    delimiter
}

/// Publish `results` to every configured destination.
pub fn publish_results(
    results: &RunResults,
    results_file: Option<&Path>,
    step_output_file: Option<&Path>,
) -> Result<()> {
    let json = results.to_json()?;

    if let Some(path) = results_file {
        fs::write(path, &json)?;
        tracing::info!("Wrote results to {}", path.display());
    }
    if let Some(path) = step_output_file {
        append_step_output(path, RESULTS_OUTPUT, &json)?;
        tracing::debug!("Set output {} in {}", RESULTS_OUTPUT, path.display());
    }

    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_step_output_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output");
        fs::write(&path, "other=1\n").unwrap();

        append_step_output(&path, "results", "{\"setup\":\"ok\\n\"}").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "other=1");
        assert!(lines[1].starts_with("results<<phasebook_"));
        assert_eq!(lines[2], "{\"setup\":\"ok\\n\"}");
        assert_eq!(lines[3], &lines[1]["results<<".len()..]);
    }

    #[test]
    fn test_publish_results_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let mut results = RunResults::new();
        results.record("setup", "done\n".into());

        publish_results(&results, Some(&path), None).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["setup"], "done\n");
    }
}
