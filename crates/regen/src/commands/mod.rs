//! Command implementations
//!
//! Each command loads the project configuration, evaluates the selected
//! units and renders a report. Rendering is left to the caller: commands
//! never write to stdout themselves.

pub mod clean;
pub mod run;
pub mod status;

use crate::cli::{CliError, ErrorEnvelope, OkEnvelope, error_details};
use crate::config::{LoadedConfig, ProjectConfig};
use crate::expr::{EnvMap, process_env};
use crate::host::PreparedUnit;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Internal command representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run stale generators
    Run {
        /// Configuration file
        config: PathBuf,
        /// Selected units; empty for all
        units: Vec<String>,
        /// `--force` flag
        force: bool,
        /// Parallelism
        jobs: Option<usize>,
    },
    /// Report verdicts
    Status {
        /// Configuration file
        config: PathBuf,
        /// Selected units; empty for all
        units: Vec<String>,
    },
    /// Remove records
    Clean {
        /// Configuration file
        config: PathBuf,
        /// Selected units; empty for all
        units: Vec<String>,
    },
}

/// Rendered result of a command
#[derive(Debug)]
pub struct CommandOutput {
    /// Report for stdout. In JSON mode a failed command's report is already
    /// an error envelope and `error` must not be rendered again.
    pub report: String,
    /// Set when the command completed but some unit failed
    pub error: Option<CliError>,
}

/// Execute `command` against the current process environment.
pub fn execute(command: Command, json: bool) -> Result<CommandOutput, CliError> {
    execute_with_env(command, json, Arc::new(process_env()))
}

/// Execute `command` with an explicit environment snapshot.
pub fn execute_with_env(
    command: Command,
    json: bool,
    env: Arc<EnvMap>,
) -> Result<CommandOutput, CliError> {
    match command {
        Command::Run {
            config,
            units,
            force,
            jobs,
        } => run::execute(&config, &units, force, jobs, json, env),
        Command::Status { config, units } => status::execute(&config, &units, json, env),
        Command::Clean { config, units } => clean::execute(&config, &units, json, env),
    }
}

/// Load the configuration and prepare the selected units.
pub(crate) fn prepare_units(
    config_path: &Path,
    names: &[String],
    env: &Arc<EnvMap>,
    force_override: Option<&str>,
) -> Result<Vec<PreparedUnit>, CliError> {
    let LoadedConfig {
        project_dir,
        config,
    } = load_config(config_path)?;

    config
        .select(names)?
        .into_iter()
        .map(|unit| {
            PreparedUnit::prepare(&project_dir, unit, Arc::clone(env), force_override)
                .map_err(CliError::from)
        })
        .collect()
}

fn load_config(path: &Path) -> Result<LoadedConfig, CliError> {
    ProjectConfig::load(path).map_err(|e| match e {
        regen_cache::Error::Io { source, .. } => CliError::config_with_help(
            format!("Couldn't read {}: {source}", path.display()),
            "Pass the configuration file with --config",
        ),
        other => CliError::from(other),
    })
}

/// One line of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    /// Unit name
    pub unit: String,
    /// Short status label
    pub status: &'static str,
    /// Details, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl UnitReport {
    fn render_line(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {} ({detail})", self.unit, self.status),
            None => format!("{}: {}", self.unit, self.status),
        }
    }
}

/// Render reports as text lines or a single JSON envelope.
///
/// In JSON mode `error` turns the envelope into an error envelope that still
/// carries the reports.
pub(crate) fn render_reports<S>(
    reports: &[UnitReport],
    summary: S,
    json: bool,
    error: Option<&CliError>,
) -> Result<String, CliError>
where
    S: Serialize + std::fmt::Display,
{
    if json {
        #[derive(Serialize)]
        struct Payload<'a, S> {
            units: &'a [UnitReport],
            summary: S,
        }
        let payload = Payload {
            units: reports,
            summary,
        };
        let rendered = match error {
            Some(err) => {
                serde_json::to_string(&ErrorEnvelope::with_data(error_details(err), payload))
            }
            None => serde_json::to_string(&OkEnvelope::new(payload)),
        };
        let mut out =
            rendered.map_err(|e| CliError::other(format!("Failed to serialize report: {e}")))?;
        out.push('\n');
        Ok(out)
    } else {
        let mut out = String::new();
        for report in reports {
            out.push_str(&report.render_line());
            out.push('\n');
        }
        out.push_str(&summary.to_string());
        out.push('\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Count(usize);

    impl std::fmt::Display for Count {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{} unit(s)", self.0)
        }
    }

    fn reports() -> Vec<UnitReport> {
        vec![
            UnitReport {
                unit: "db".into(),
                status: "skipped",
                detail: None,
            },
            UnitReport {
                unit: "api".into(),
                status: "generated",
                detail: Some("no checksum record exists".into()),
            },
        ]
    }

    #[test]
    fn renders_text() {
        let out = render_reports(&reports(), Count(2), false, None).unwrap();
        assert_eq!(
            out,
            "db: skipped\napi: generated (no checksum record exists)\n2 unit(s)\n"
        );
    }

    #[test]
    fn renders_json_envelope() {
        let out = render_reports(&reports(), Count(2), true, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"]["units"][0]["unit"], "db");
        assert!(value["data"]["units"][0].get("detail").is_none());
        assert_eq!(value["data"]["summary"], 2);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failure_renders_one_error_envelope_with_reports() {
        let err = CliError::generation_with_help("1 of 2 unit(s) failed", "rerun");
        let out = render_reports(&reports(), Count(2), true, Some(&err)).unwrap();
        assert_eq!(out.lines().count(), 1);

        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], "generation");
        assert_eq!(value["data"]["units"][1]["status"], "generated");
        assert_eq!(value["data"]["summary"], 2);
    }

    #[test]
    fn text_report_ignores_error() {
        let err = CliError::other("boom");
        let out = render_reports(&reports(), Count(2), false, Some(&err)).unwrap();
        assert!(!out.contains("boom"));
    }

    #[test]
    fn missing_config_is_a_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = prepare_units(
            &tmp.path().join("regen.toml"),
            &[],
            &Arc::new(EnvMap::new()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }
}
