//! Before/after hand-off for one build's generation steps
//!
//! Lifecycle of a build unit's state:
//!
//! ```text
//! before_generation ──► Skipped ──► after_* ──► removed (record untouched)
//!                   └─► Executed ─► after_generation_success ──► record saved
//!                                └► after_generation_failure ──► record deleted
//! ```
//!
//! Units whose patterns resolve to nothing never get state: the guard opts
//! out and the record is neither read nor written.

use crate::checksum::checksum;
use crate::decision::{GenerationRequest, Verdict, assess};
use crate::pattern::{PathEvaluator, ResolvedInputs};
use crate::record::{self, ChecksumRecord};
use crate::{Error, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of one independently buildable project or module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildUnit(String);

impl BuildUnit {
    /// Create a build unit identity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identity string.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BuildUnit {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Where a tracked unit stands between the two call points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Verdict was skip; the generation step is suppressed
    Skipped,
    /// Generation is running under the host's control
    Executed,
}

/// State carried from `before_generation` to the matching `after_*` call.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    /// Checksum computed before generation
    pub checksum: String,
    /// Inputs the checksum was computed over
    pub resolved_inputs: ResolvedInputs,
    /// Project base directory
    pub base_dir: PathBuf,
    /// Output directory holding the record
    pub output_dir: PathBuf,
    /// Current phase
    pub phase: Phase,
}

impl ExecutionState {
    /// `true` when generation was suppressed.
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.phase == Phase::Skipped
    }
}

/// How an `after_*` call concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Nothing was tracked for the unit (guard disabled or never started)
    Untracked,
    /// Generation had been skipped; nothing to persist
    Skipped,
    /// Generation succeeded; `record` is `None` if it couldn't be written
    Succeeded {
        /// The freshly written record
        record: Option<ChecksumRecord>,
    },
    /// Generation failed and the record was discarded
    Failed,
}

/// Owns per-unit execution state for the duration of a build.
///
/// Safe to share between worker threads: state lives in a concurrent map
/// keyed by [`BuildUnit`], and each unit is only driven by one thread.
#[derive(Debug, Default)]
pub struct ExecutionCoordinator {
    states: DashMap<BuildUnit, ExecutionState>,
}

impl ExecutionCoordinator {
    /// Create a coordinator with no tracked units.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `unit` may skip generation and start tracking it.
    ///
    /// On [`Verdict::Skip`] the host must suppress the generation step.
    ///
    /// # Errors
    ///
    /// Fails when an input can't be read or a pattern can't be evaluated, and
    /// when `unit` already has live state.
    pub fn before_generation<E>(
        &self,
        unit: &BuildUnit,
        request: &GenerationRequest,
        evaluator: &E,
    ) -> Result<Verdict>
    where
        E: PathEvaluator + ?Sized,
    {
        let span = tracing::info_span!("coordinator.before", unit = %unit);
        let _guard = span.enter();

        if self.states.contains_key(unit) {
            return Err(Error::UnitAlreadyPending {
                unit: unit.to_string(),
            });
        }

        let assessment = assess(request, evaluator)?;
        let Some(checksum) = assessment.checksum else {
            return Ok(assessment.verdict);
        };

        let phase = if assessment.verdict.is_skip() {
            Phase::Skipped
        } else {
            Phase::Executed
        };
        let state = ExecutionState {
            checksum,
            resolved_inputs: assessment.inputs,
            base_dir: request.base_dir.clone(),
            output_dir: request.output_dir.clone(),
            phase,
        };

        match self.states.entry(unit.clone()) {
            Entry::Occupied(_) => Err(Error::UnitAlreadyPending {
                unit: unit.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(state);
                Ok(assessment.verdict)
            }
        }
    }

    /// Persist a fresh record after generation succeeded.
    ///
    /// The checksum is recomputed with `fingerprint` rather than reused:
    /// generation may have touched inputs or configuration. A record that
    /// can't be written only produces a warning; the next build regenerates.
    ///
    /// # Errors
    ///
    /// Fails when an input became unreadable during generation. The record is
    /// discarded in that case.
    pub fn after_generation_success(&self, unit: &BuildUnit, fingerprint: u64) -> Result<Completion> {
        let span = tracing::info_span!("coordinator.after_success", unit = %unit);
        let _guard = span.enter();

        let Some((_, state)) = self.states.remove(unit) else {
            tracing::debug!("No tracked state, nothing to persist");
            return Ok(Completion::Untracked);
        };
        if state.skipped() {
            return Ok(Completion::Skipped);
        }

        let fresh = match checksum(&state.base_dir, &state.resolved_inputs, fingerprint) {
            Ok(fresh) => fresh,
            Err(e) => {
                discard_record(&state.output_dir);
                return Err(e);
            }
        };
        if fresh != state.checksum {
            tracing::debug!(
                before = %state.checksum,
                after = %fresh,
                "Inputs changed while generating"
            );
        }

        match record::save(&state.output_dir, &fresh) {
            Ok(record) => {
                tracing::info!(
                    output = %state.output_dir.display(),
                    "Saved checksum file, next time generation will be skipped unless inputs change"
                );
                Ok(Completion::Succeeded {
                    record: Some(record),
                })
            }
            Err(e) => {
                tracing::warn!(
                    output = %state.output_dir.display(),
                    error = %e,
                    "Couldn't write checksum file, the next build will regenerate"
                );
                Ok(Completion::Succeeded { record: None })
            }
        }
    }

    /// Discard the record after generation failed, so that a retried build
    /// regenerates even with unchanged inputs.
    pub fn after_generation_failure(&self, unit: &BuildUnit) -> Completion {
        let span = tracing::info_span!("coordinator.after_failure", unit = %unit);
        let _guard = span.enter();

        let Some((_, state)) = self.states.remove(unit) else {
            tracing::debug!("No tracked state, nothing to invalidate");
            return Completion::Untracked;
        };
        discard_record(&state.output_dir);
        Completion::Failed
    }

    /// Phase of a tracked unit.
    #[must_use]
    pub fn phase(&self, unit: &BuildUnit) -> Option<Phase> {
        self.states.get(unit).map(|state| state.phase)
    }

    /// Number of units between `before_generation` and an `after_*` call.
    #[must_use]
    pub fn pending_units(&self) -> usize {
        self.states.len()
    }
}

fn discard_record(output_dir: &Path) {
    if let Err(e) = record::invalidate(output_dir) {
        tracing::warn!(
            output = %output_dir.display(),
            error = %e,
            "Couldn't remove checksum file"
        );
    }
}
