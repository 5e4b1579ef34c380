//! `regen status`

use super::{CommandOutput, UnitReport, prepare_units, render_reports};
use crate::cli::CliError;
use crate::expr::{EnvMap, force_override};
use crate::tracing::command_span;
use regen_cache::{Verdict, assess};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Verdict counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    /// Units that would be skipped
    pub up_to_date: usize,
    /// Units that would regenerate
    pub stale: usize,
    /// Units whose staleness couldn't be determined
    pub errors: usize,
    /// Units switched off by their `skip` setting
    pub disabled: usize,
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} up to date, {} stale, {} errors",
            self.up_to_date, self.stale, self.errors
        )?;
        if self.disabled > 0 {
            write!(f, ", {} disabled", self.disabled)?;
        }
        Ok(())
    }
}

/// Report each selected unit's verdict without running or writing anything.
///
/// The override channel is honoured so that the report matches what `run`
/// would do.
pub fn execute(
    config: &Path,
    units: &[String],
    json: bool,
    env: Arc<EnvMap>,
) -> Result<CommandOutput, CliError> {
    let _span = command_span("status").entered();

    let override_value = force_override(false, &env);
    let prepared = prepare_units(config, units, &env, override_value.as_deref())?;

    let mut summary = StatusSummary::default();
    let mut reports = Vec::with_capacity(prepared.len());
    for unit in &prepared {
        if unit.disabled {
            summary.disabled += 1;
            reports.push(UnitReport {
                unit: unit.unit.to_string(),
                status: "disabled",
                detail: None,
            });
            continue;
        }
        let report = match assess(&unit.request, &unit.evaluator) {
            Ok(assessment) => match assessment.verdict {
                Verdict::Skip => {
                    summary.up_to_date += 1;
                    UnitReport {
                        unit: unit.unit.to_string(),
                        status: "up-to-date",
                        detail: None,
                    }
                }
                Verdict::Regenerate(reason) => {
                    summary.stale += 1;
                    UnitReport {
                        unit: unit.unit.to_string(),
                        status: "stale",
                        detail: Some(reason.to_string()),
                    }
                }
            },
            Err(e) => {
                summary.errors += 1;
                UnitReport {
                    unit: unit.unit.to_string(),
                    status: "error",
                    detail: Some(e.to_string()),
                }
            }
        };
        reports.push(report);
    }

    let error = (summary.errors > 0).then(|| {
        CliError::generation_with_help(
            format!("{} unit(s) couldn't be checked", summary.errors),
            "Every file matched by the input patterns must exist and be readable",
        )
    });

    Ok(CommandOutput {
        report: render_reports(&reports, summary, json, error.as_ref())?,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn status_reports_without_writing() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("in")).unwrap();
        fs::write(tmp.path().join("in/a.txt"), "a").unwrap();
        let config = tmp.path().join("regen.toml");
        fs::write(
            &config,
            "[[unit]]\nname = \"db\"\ninputs = [\"in/*.txt\"]\noutput_dir = \"out\"\ncommand = \"gen\"\n",
        )
        .unwrap();

        let output = execute(&config, &[], false, Arc::new(EnvMap::new())).unwrap();
        assert_eq!(
            output.report,
            "db: stale (no checksum record exists)\n0 up to date, 1 stale, 0 errors\n"
        );
        assert!(output.error.is_none());
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn disabled_unit_is_not_assessed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = tmp.path().join("regen.toml");
        // the literal input doesn't exist, assessing it would fail
        fs::write(
            &config,
            "[[unit]]\nname = \"db\"\ninputs = [\"missing.sql\"]\nskip = \"${env.SKIP_DB}\"\ncommand = \"gen\"\n",
        )
        .unwrap();
        let env = EnvMap::from([("SKIP_DB".to_string(), "true".to_string())]);

        let output = execute(&config, &[], false, Arc::new(env)).unwrap();
        assert_eq!(
            output.report,
            "db: disabled\n0 up to date, 0 stale, 0 errors, 1 disabled\n"
        );
        assert!(output.error.is_none());
    }
}
