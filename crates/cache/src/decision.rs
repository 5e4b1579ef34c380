//! Skip/regenerate verdicts
//!
//! The verdict only says whether generation may be skipped. How a skip is
//! carried out (not spawning a process, flipping a tool's own skip flag, ...)
//! belongs to the host.

use crate::checksum::checksum;
use crate::pattern::{PathEvaluator, ResolvedInputs, resolve_inputs};
use crate::record::{self, ChecksumRecord};
use crate::Result;
use std::fmt;
use std::path::{Path, PathBuf};

/// Why generation has to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegenerateReason {
    /// Forced by the override channel or the unit's own flag
    Forced,
    /// No input pattern matched anything; the guard is disabled
    NoInputs,
    /// No usable record in the output directory
    NoRecord,
    /// Inputs or configuration changed since the record was written
    ChecksumMismatch {
        /// Checksum stored in the record
        recorded: String,
        /// Checksum computed now
        fresh: String,
    },
    /// A file listed in the record is gone
    MissingOutput {
        /// Path relative to the output directory
        path: String,
    },
}

impl fmt::Display for RegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "regeneration is forced"),
            Self::NoInputs => write!(f, "no input files are configured"),
            Self::NoRecord => write!(f, "no checksum record exists"),
            Self::ChecksumMismatch { .. } => write!(f, "inputs or configuration changed"),
            Self::MissingOutput { path } => write!(f, "generated file {path} doesn't exist anymore"),
        }
    }
}

/// Outcome of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Outputs are up to date; the generation step must be suppressed
    Skip,
    /// Generation must run
    Regenerate(RegenerateReason),
}

impl Verdict {
    /// `true` for [`Verdict::Skip`].
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "up to date"),
            Self::Regenerate(reason) => write!(f, "stale: {reason}"),
        }
    }
}

/// Decide whether generation may be skipped. First matching rule wins:
///
/// 1. forced
/// 2. no record
/// 3. checksum differs
/// 4. a recorded output file is missing
/// 5. otherwise skip
#[must_use]
pub fn decide(
    forced: bool,
    record: Option<&ChecksumRecord>,
    fresh_checksum: &str,
    output_dir: &Path,
) -> Verdict {
    if forced {
        return Verdict::Regenerate(RegenerateReason::Forced);
    }
    let Some(record) = record else {
        return Verdict::Regenerate(RegenerateReason::NoRecord);
    };
    if record.checksum != fresh_checksum {
        return Verdict::Regenerate(RegenerateReason::ChecksumMismatch {
            recorded: record.checksum.clone(),
            fresh: fresh_checksum.to_string(),
        });
    }
    // Outputs may have been deleted by hand since the record was written
    if let Some(path) = record.missing_output(output_dir) {
        return Verdict::Regenerate(RegenerateReason::MissingOutput {
            path: path.to_string(),
        });
    }
    Verdict::Skip
}

/// Everything the guard needs to know about one generation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Project base directory; resolved inputs are relative to it
    pub base_dir: PathBuf,
    /// Input patterns in declaration order, before evaluation
    pub patterns: Vec<String>,
    /// Directory the generator writes into; holds the sidecar record
    pub output_dir: PathBuf,
    /// Configuration fingerprint of the generation step
    pub fingerprint: u64,
    /// Force flag after override precedence has been applied
    pub forced: bool,
}

/// Result of [`assess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Inputs the checksum was computed over
    pub inputs: ResolvedInputs,
    /// Fresh checksum; `None` when there are no inputs
    pub checksum: Option<String>,
    /// The decision
    pub verdict: Verdict,
}

/// Resolve inputs, checksum them and decide, without writing anything.
///
/// With no inputs the record is not even read.
pub fn assess<E>(request: &GenerationRequest, evaluator: &E) -> Result<Assessment>
where
    E: PathEvaluator + ?Sized,
{
    let inputs = resolve_inputs(&request.base_dir, &request.patterns, evaluator)?;
    if inputs.is_empty() {
        tracing::info!(
            base = %request.base_dir.display(),
            "Couldn't find any configured input files, generation will run as usual"
        );
        return Ok(Assessment {
            inputs,
            checksum: None,
            verdict: Verdict::Regenerate(RegenerateReason::NoInputs),
        });
    }

    tracing::debug!(inputs = ?inputs.files(), "Using these input files to determine staleness");

    let fresh = checksum(&request.base_dir, &inputs, request.fingerprint)?;
    let record = if request.forced {
        None
    } else {
        record::load(&request.output_dir)
    };
    let verdict = decide(request.forced, record.as_ref(), &fresh, &request.output_dir);

    match &verdict {
        Verdict::Skip => tracing::info!(
            output = %request.output_dir.display(),
            "Checksums matched and all generated files exist, generation will be skipped"
        ),
        Verdict::Regenerate(reason) => tracing::info!(
            output = %request.output_dir.display(),
            %reason,
            "Generation will run"
        ),
    }

    Ok(Assessment {
        inputs,
        checksum: Some(fresh),
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn output_with(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for f in files {
            fs::write(tmp.path().join(f), f).unwrap();
        }
        tmp
    }

    #[test]
    fn forced_wins_over_matching_record() {
        let out = output_with(&["A.java"]);
        let record = ChecksumRecord::new("1", ["A.java".to_string()]);
        assert_eq!(
            decide(true, Some(&record), "1", out.path()),
            Verdict::Regenerate(RegenerateReason::Forced)
        );
    }

    #[test]
    fn absent_record_regenerates() {
        let out = output_with(&[]);
        assert_eq!(
            decide(false, None, "1", out.path()),
            Verdict::Regenerate(RegenerateReason::NoRecord)
        );
    }

    #[test]
    fn checksum_mismatch_regenerates() {
        let out = output_with(&["A.java"]);
        let record = ChecksumRecord::new("1", ["A.java".to_string()]);
        assert!(matches!(
            decide(false, Some(&record), "2", out.path()),
            Verdict::Regenerate(RegenerateReason::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn decide_is_idempotent_until_an_output_disappears() {
        let out = output_with(&["A.java", "B.java"]);
        let record = ChecksumRecord::new("1", ["A.java".to_string(), "B.java".to_string()]);

        assert_eq!(decide(false, Some(&record), "1", out.path()), Verdict::Skip);
        assert_eq!(decide(false, Some(&record), "1", out.path()), Verdict::Skip);

        fs::remove_file(out.path().join("B.java")).unwrap();
        assert_eq!(
            decide(false, Some(&record), "1", out.path()),
            Verdict::Regenerate(RegenerateReason::MissingOutput {
                path: "B.java".to_string()
            })
        );
    }

    #[test]
    fn record_with_no_files_skips_on_match() {
        let out = output_with(&[]);
        let record = ChecksumRecord::new("1", Vec::<String>::new());
        assert!(decide(false, Some(&record), "1", out.path()).is_skip());
    }

    #[test]
    fn assess_without_inputs_never_reads_the_record() {
        let tmp = TempDir::new().unwrap();
        // A record that would otherwise match is ignored
        fs::write(record::record_path(tmp.path()), "x\n").unwrap();
        let request = GenerationRequest {
            base_dir: tmp.path().to_path_buf(),
            patterns: vec![],
            output_dir: tmp.path().to_path_buf(),
            fingerprint: 0,
            forced: false,
        };
        let evaluator = |raw: &str| -> Result<String> { Ok(raw.to_string()) };
        let assessment = assess(&request, &evaluator).unwrap();
        assert_eq!(
            assessment.verdict,
            Verdict::Regenerate(RegenerateReason::NoInputs)
        );
        assert!(assessment.checksum.is_none());
    }

    #[test]
    fn verdict_display() {
        assert_eq!(Verdict::Skip.to_string(), "up to date");
        assert_eq!(
            Verdict::Regenerate(RegenerateReason::NoRecord).to_string(),
            "stale: no checksum record exists"
        );
    }
}
