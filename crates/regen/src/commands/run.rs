//! `regen run`

use super::{CommandOutput, UnitReport, prepare_units, render_reports};
use crate::cli::CliError;
use crate::expr::{EnvMap, force_override};
use crate::host::{PreparedUnit, UnitOutcome, run_unit};
use crate::tracing::command_span;
use rayon::prelude::*;
use regen_cache::ExecutionCoordinator;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Outcome counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Units whose generator ran and succeeded
    pub generated: usize,
    /// Units that were up to date
    pub skipped: usize,
    /// Units that failed
    pub failed: usize,
    /// Units switched off by their `skip` setting
    pub disabled: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} generated, {} skipped, {} failed",
            self.generated, self.skipped, self.failed
        )?;
        if self.disabled > 0 {
            write!(f, ", {} disabled", self.disabled)?;
        }
        Ok(())
    }
}

/// Run every selected unit through the guard, `jobs` at a time (`0` or
/// `None` means one per CPU).
pub fn execute(
    config: &Path,
    units: &[String],
    force: bool,
    jobs: Option<usize>,
    json: bool,
    env: Arc<EnvMap>,
) -> Result<CommandOutput, CliError> {
    let _span = command_span("run").entered();

    let override_value = force_override(force, &env);
    let prepared = prepare_units(config, units, &env, override_value.as_deref())?;
    let coordinator = ExecutionCoordinator::new();
    let outcomes = run_all(&coordinator, &prepared, jobs)?;

    let mut summary = RunSummary::default();
    let reports: Vec<UnitReport> = prepared
        .iter()
        .zip(&outcomes)
        .map(|(unit, outcome)| {
            let detail = match outcome {
                UnitOutcome::Disabled => {
                    summary.disabled += 1;
                    None
                }
                UnitOutcome::Skipped => {
                    summary.skipped += 1;
                    None
                }
                UnitOutcome::Generated { reason, recorded } => {
                    summary.generated += 1;
                    Some(if *recorded {
                        reason.to_string()
                    } else {
                        format!("{reason}; checksum record not written")
                    })
                }
                UnitOutcome::Failed { reason } => {
                    summary.failed += 1;
                    Some(reason.clone())
                }
            };
            UnitReport {
                unit: unit.unit.to_string(),
                status: outcome.label(),
                detail,
            }
        })
        .collect();

    tracing::info!(
        generated = summary.generated,
        skipped = summary.skipped,
        failed = summary.failed,
        disabled = summary.disabled,
        "Run finished"
    );

    let error = (summary.failed > 0).then(|| {
        CliError::generation_with_help(
            format!("{} of {} unit(s) failed", summary.failed, outcomes.len()),
            "Their checksum records were removed, the next run regenerates them",
        )
    });

    Ok(CommandOutput {
        report: render_reports(&reports, summary, json, error.as_ref())?,
        error,
    })
}

fn run_all(
    coordinator: &ExecutionCoordinator,
    prepared: &[PreparedUnit],
    jobs: Option<usize>,
) -> Result<Vec<UnitOutcome>, CliError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .thread_name(|index| format!("regen-worker-{index}"))
        .build()
        .map_err(|e| CliError::other(format!("Failed to start worker pool: {e}")))?;

    Ok(pool.install(|| {
        prepared
            .par_iter()
            .map(|unit| run_unit(coordinator, unit))
            .collect()
    }))
}
