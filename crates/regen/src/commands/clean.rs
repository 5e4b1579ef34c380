//! `regen clean`

use super::{CommandOutput, UnitReport, prepare_units, render_reports};
use crate::cli::CliError;
use crate::expr::EnvMap;
use crate::tracing::command_span;
use regen_cache::record;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Number of records removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanSummary {
    /// Records deleted
    pub removed: usize,
    /// Units that had no record
    pub absent: usize,
}

impl fmt::Display for CleanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} removed, {} without record", self.removed, self.absent)
    }
}

/// Delete the checksum record of each selected unit. Generated files are
/// left alone.
pub fn execute(
    config: &Path,
    units: &[String],
    json: bool,
    env: Arc<EnvMap>,
) -> Result<CommandOutput, CliError> {
    let _span = command_span("clean").entered();

    let prepared = prepare_units(config, units, &env, None)?;

    let mut summary = CleanSummary::default();
    let mut reports = Vec::with_capacity(prepared.len());
    for unit in &prepared {
        let removed = record::invalidate(&unit.request.output_dir)?;
        let status = if removed {
            summary.removed += 1;
            "removed"
        } else {
            summary.absent += 1;
            "no-record"
        };
        reports.push(UnitReport {
            unit: unit.unit.to_string(),
            status,
            detail: None,
        });
    }

    Ok(CommandOutput {
        report: render_reports(&reports, summary, json, None)?,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn removes_only_selected_records() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = tmp.path().join("regen.toml");
        fs::write(
            &config,
            r#"
[[unit]]
name = "a"
output_dir = "out/a"
command = "gen"

[[unit]]
name = "b"
output_dir = "out/b"
command = "gen"
"#,
        )
        .unwrap();
        for name in ["a", "b"] {
            let out = tmp.path().join("out").join(name);
            fs::create_dir_all(&out).unwrap();
            record::save(&out, "1").unwrap();
        }

        let output = execute(&config, &["a".to_string()], false, Arc::new(EnvMap::new())).unwrap();
        assert_eq!(output.report, "a: removed\n1 removed, 0 without record\n");
        assert!(record::load(&tmp.path().join("out/a")).is_none());
        assert!(record::load(&tmp.path().join("out/b")).is_some());

        let again = execute(&config, &["a".to_string()], false, Arc::new(EnvMap::new())).unwrap();
        assert!(again.report.starts_with("a: no-record\n"));
    }
}
