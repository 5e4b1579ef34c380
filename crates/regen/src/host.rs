//! Generator host
//!
//! Wraps a unit's generator process in the staleness guard. A skip verdict
//! is carried out by not spawning the process at all.

use crate::config::UnitConfig;
use crate::expr::{EnvMap, ProjectEvaluator};
use regen_cache::{
    BuildUnit, Completion, ExecutionCoordinator, GenerationRequest, RegenerateReason, Result,
    Verdict, fingerprint,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

/// Configuration a unit's fingerprint is derived from.
#[derive(Debug, Serialize)]
struct GeneratorSignature<'a> {
    command: &'a str,
    args: &'a [String],
    env: &'a BTreeMap<String, String>,
    output_dir: &'a Path,
}

/// A unit with every expression evaluated, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedUnit {
    /// Unit identity
    pub unit: BuildUnit,
    /// Base directory; the generator runs here
    pub root: PathBuf,
    /// Generator executable
    pub command: String,
    /// Expanded generator arguments
    pub args: Vec<String>,
    /// Expanded extra environment
    pub env: BTreeMap<String, String>,
    /// Switched off by the unit's `skip` setting
    pub disabled: bool,
    /// What the guard gets to see. The fingerprint is computed once here;
    /// nothing in this host changes a unit's configuration afterwards.
    pub request: GenerationRequest,
    /// Evaluator for the unit's input patterns
    pub evaluator: ProjectEvaluator,
}

impl PreparedUnit {
    /// Evaluate `config` relative to `project_dir`.
    ///
    /// `force_override` is the value of the override channel, if any.
    pub fn prepare(
        project_dir: &Path,
        config: &UnitConfig,
        env: Arc<EnvMap>,
        force_override: Option<&str>,
    ) -> Result<Self> {
        let root = project_dir.join(&config.root);
        let evaluator = ProjectEvaluator::new(&root, &config.name, env);
        let output_dir = evaluator.evaluate_dir(&config.output_dir)?;
        let evaluator = evaluator.with_output_dir(&output_dir);

        let args = config
            .args
            .iter()
            .map(|arg| evaluator.expand(arg))
            .collect::<Result<Vec<_>>>()?;
        let env = config
            .env
            .iter()
            .map(|(key, value)| Ok((key.clone(), evaluator.expand(value)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let forced = evaluator.resolve_force(force_override, config.force.as_ref());
        let disabled = evaluator.resolve_skip(config.skip.as_ref());

        let mut prepared = Self {
            unit: BuildUnit::new(config.name.as_str()),
            root: root.clone(),
            command: config.command.clone(),
            args,
            env,
            disabled,
            request: GenerationRequest {
                base_dir: root,
                patterns: config.inputs.clone(),
                output_dir,
                fingerprint: 0,
                forced,
            },
            evaluator,
        };
        prepared.request.fingerprint = prepared.fingerprint()?;
        Ok(prepared)
    }

    /// Fingerprint of the generator command, arguments, environment and
    /// output directory.
    fn fingerprint(&self) -> Result<u64> {
        fingerprint(&GeneratorSignature {
            command: &self.command,
            args: &self.args,
            env: &self.env,
            output_dir: &self.request.output_dir,
        })
    }
}

/// How one unit's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The unit's `skip` setting is on; the guard wasn't consulted
    Disabled,
    /// Outputs were up to date; the generator didn't run
    Skipped,
    /// The generator ran and succeeded
    Generated {
        /// Why it had to run
        reason: RegenerateReason,
        /// Whether a checksum record was written
        recorded: bool,
    },
    /// The guard or the generator failed
    Failed {
        /// Human-readable cause
        reason: String,
    },
}

impl UnitOutcome {
    /// Short status label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Skipped => "skipped",
            Self::Generated { .. } => "generated",
            Self::Failed { .. } => "failed",
        }
    }

    /// `true` for [`UnitOutcome::Failed`].
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Run `prepared` through the guard.
///
/// A disabled unit is left alone: no generator, no record, no coordinator
/// state. Errors never escape: a unit that can't be checked or generated is
/// reported as [`UnitOutcome::Failed`] so that other units keep going.
pub fn run_unit(coordinator: &ExecutionCoordinator, prepared: &PreparedUnit) -> UnitOutcome {
    let span = tracing::info_span!("unit", unit = %prepared.unit);
    let _guard = span.enter();

    if prepared.disabled {
        tracing::info!("Unit is disabled by its skip setting, leaving it alone");
        return UnitOutcome::Disabled;
    }

    let verdict = match coordinator.before_generation(
        &prepared.unit,
        &prepared.request,
        &prepared.evaluator,
    ) {
        Ok(verdict) => verdict,
        Err(e) => {
            tracing::error!(error = %e, "Couldn't determine whether generation is needed");
            return UnitOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    let reason = match verdict {
        Verdict::Skip => {
            if let Err(e) = coordinator.after_generation_success(&prepared.unit, prepared.request.fingerprint) {
                tracing::warn!(error = %e, "Couldn't finish skipped unit");
            }
            return UnitOutcome::Skipped;
        }
        Verdict::Regenerate(reason) => reason,
    };

    match spawn_generator(prepared) {
        Ok(status) if status.success() => {}
        Ok(status) => {
            coordinator.after_generation_failure(&prepared.unit);
            tracing::error!(%status, command = %prepared.command, "Generator failed");
            return UnitOutcome::Failed {
                reason: format!("generator {} {status}", prepared.command),
            };
        }
        Err(e) => {
            coordinator.after_generation_failure(&prepared.unit);
            tracing::error!(error = %e, command = %prepared.command, "Couldn't start generator");
            return UnitOutcome::Failed {
                reason: format!("couldn't start generator {}: {e}", prepared.command),
            };
        }
    }

    match coordinator.after_generation_success(&prepared.unit, prepared.request.fingerprint) {
        Ok(Completion::Succeeded { record }) => UnitOutcome::Generated {
            reason,
            recorded: record.is_some(),
        },
        Ok(_) => UnitOutcome::Generated {
            reason,
            recorded: false,
        },
        Err(e) => {
            // the coordinator already dropped the state and the record
            tracing::error!(error = %e, "Couldn't recompute checksum after generation");
            UnitOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

fn spawn_generator(prepared: &PreparedUnit) -> io::Result<ExitStatus> {
    fs::create_dir_all(&prepared.request.output_dir)?;

    tracing::info!(
        command = %prepared.command,
        args = ?prepared.args,
        cwd = %prepared.root.display(),
        "Running generator"
    );

    // stdout is reserved for regen's own report
    Command::new(&prepared.command)
        .args(&prepared.args)
        .envs(&prepared.env)
        .current_dir(&prepared.root)
        .stdin(Stdio::null())
        .stdout(Stdio::from(io::stderr()))
        .status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlagSetting, ProjectConfig};
    use regen_cache::record;
    use tempfile::TempDir;

    fn unit_config(command: &str, args: &[&str]) -> UnitConfig {
        UnitConfig {
            name: "db".to_string(),
            root: PathBuf::from("."),
            inputs: vec!["schema/*.sql".to_string()],
            force: None,
            skip: None,
            output_dir: "out".to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            env: BTreeMap::new(),
        }
    }

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("schema")).unwrap();
        fs::write(tmp.path().join("schema/a.sql"), "create table a (id int);").unwrap();
        tmp
    }

    fn env() -> Arc<EnvMap> {
        Arc::new(EnvMap::from([("MODE".to_string(), "strict".to_string())]))
    }

    #[test]
    fn prepare_expands_arguments_and_environment() {
        let tmp = project();
        let mut config = unit_config("gen", &["--out", "${output_dir}", "--name=${unit.name}"]);
        config.env.insert("GEN_MODE".to_string(), "${env.MODE}".to_string());

        let prepared = PreparedUnit::prepare(tmp.path(), &config, env(), None).unwrap();
        let out = tmp.path().join("./out");
        assert_eq!(prepared.request.output_dir, tmp.path().join(".").join("out"));
        assert_eq!(prepared.args[1], out.to_string_lossy());
        assert_eq!(prepared.args[2], "--name=db");
        assert_eq!(prepared.env.get("GEN_MODE").map(String::as_str), Some("strict"));
        assert!(!prepared.request.forced);
    }

    #[test]
    fn fingerprint_tracks_generator_configuration() {
        let tmp = project();
        let a = PreparedUnit::prepare(tmp.path(), &unit_config("gen", &["-v"]), env(), None).unwrap();
        let b = PreparedUnit::prepare(tmp.path(), &unit_config("gen", &["-v"]), env(), None).unwrap();
        let c = PreparedUnit::prepare(tmp.path(), &unit_config("gen", &["-q"]), env(), None).unwrap();
        assert_eq!(a.request.fingerprint, b.request.fingerprint);
        assert_ne!(a.request.fingerprint, c.request.fingerprint);
    }

    #[test]
    fn prepare_applies_force_precedence() {
        let tmp = project();
        let mut config = unit_config("gen", &[]);
        config.force = Some(FlagSetting::Flag(true));

        let forced = PreparedUnit::prepare(tmp.path(), &config, env(), None).unwrap();
        assert!(forced.request.forced);
        let overridden = PreparedUnit::prepare(tmp.path(), &config, env(), Some("false")).unwrap();
        assert!(!overridden.request.forced);
    }

    #[test]
    fn prepare_rejects_unknown_placeholder() {
        let tmp = project();
        let config = unit_config("gen", &["${nope}"]);
        assert!(PreparedUnit::prepare(tmp.path(), &config, env(), None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn second_run_skips_the_generator() {
        let tmp = project();
        let config = ProjectConfig::from_toml_str(
            r#"
[[unit]]
name = "db"
inputs = ["schema/*.sql"]
output_dir = "out"
command = "sh"
args = ["-c", "echo run >> runs.log && echo 'class A {}' > \"$0\"/A.java", "${output_dir}"]
"#,
        )
        .unwrap();
        let coordinator = ExecutionCoordinator::new();
        let prepared = PreparedUnit::prepare(tmp.path(), &config.units[0], env(), None).unwrap();

        assert!(matches!(
            run_unit(&coordinator, &prepared),
            UnitOutcome::Generated { recorded: true, .. }
        ));
        assert_eq!(run_unit(&coordinator, &prepared), UnitOutcome::Skipped);
        assert_eq!(fs::read_to_string(tmp.path().join("runs.log")).unwrap(), "run\n");
        assert_eq!(coordinator.pending_units(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn failing_generator_discards_record() {
        let tmp = project();
        let coordinator = ExecutionCoordinator::new();
        let ok = PreparedUnit::prepare(tmp.path(), &unit_config("true", &[]), env(), None).unwrap();
        run_unit(&coordinator, &ok);
        assert!(record::load(&ok.request.output_dir).is_some());

        let failing =
            PreparedUnit::prepare(tmp.path(), &unit_config("false", &[]), env(), Some("true")).unwrap();
        assert!(run_unit(&coordinator, &failing).is_failure());
        assert!(record::load(&failing.request.output_dir).is_none());
    }

    #[test]
    fn disabled_unit_spawns_nothing_and_keeps_its_record() {
        let tmp = project();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let existing = record::save(&out, "1").unwrap();

        let mut config = unit_config("regen-test-no-such-generator", &[]);
        config.skip = Some(FlagSetting::Expression("${env.MODE}".to_string()));
        assert!(!PreparedUnit::prepare(tmp.path(), &config, env(), None).unwrap().disabled);

        config.skip = Some(FlagSetting::Flag(true));
        let prepared = PreparedUnit::prepare(tmp.path(), &config, env(), Some("true")).unwrap();
        assert!(prepared.disabled);

        let coordinator = ExecutionCoordinator::new();
        assert_eq!(run_unit(&coordinator, &prepared), UnitOutcome::Disabled);
        assert!(coordinator.phase(&prepared.unit).is_none());
        assert_eq!(coordinator.pending_units(), 0);
        assert_eq!(record::load(&out), Some(existing));
    }

    #[test]
    fn missing_generator_is_a_failure() {
        let tmp = project();
        let coordinator = ExecutionCoordinator::new();
        let prepared = PreparedUnit::prepare(
            tmp.path(),
            &unit_config("regen-test-no-such-generator", &[]),
            env(),
            None,
        )
        .unwrap();
        let outcome = run_unit(&coordinator, &prepared);
        assert!(outcome.is_failure());
        assert_eq!(coordinator.pending_units(), 0);
    }
}
