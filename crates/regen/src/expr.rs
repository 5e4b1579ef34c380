//! Placeholder expressions in unit configuration
//!
//! Supported placeholders:
//!
//! | Placeholder                        | Value                                   |
//! |------------------------------------|-----------------------------------------|
//! | `${basedir}`, `${project.basedir}` | unit base directory                     |
//! | `${unit.name}`                     | unit name                               |
//! | `${output_dir}`                    | evaluated output directory              |
//! | `${env.NAME}`                      | environment variable `NAME`             |
//!
//! `$$` produces a literal `$`. A `$` followed by anything else is kept as is.

use crate::config::FlagSetting;
use regen_cache::{Error, PathEvaluator, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable carrying the force override.
pub const FORCE_ENV: &str = "REGEN_FORCE";

/// Snapshot of the environment visible to expressions
pub type EnvMap = BTreeMap<String, String>;

/// Capture the process environment, skipping entries that aren't valid UTF-8.
#[must_use]
pub fn process_env() -> EnvMap {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Evaluates expressions for one unit.
#[derive(Debug, Clone)]
pub struct ProjectEvaluator {
    base_dir: PathBuf,
    unit_name: String,
    output_dir: Option<PathBuf>,
    env: Arc<EnvMap>,
}

impl ProjectEvaluator {
    /// Evaluator for `unit_name` rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, unit_name: impl Into<String>, env: Arc<EnvMap>) -> Self {
        Self {
            base_dir: base_dir.into(),
            unit_name: unit_name.into(),
            output_dir: None,
            env,
        }
    }

    /// Make `${output_dir}` available.
    #[must_use]
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Substitute every placeholder in `raw`.
    pub fn expand(&self, raw: &str) -> Result<String> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos + 1..];
            if let Some(after) = tail.strip_prefix('$') {
                out.push('$');
                rest = after;
            } else if let Some(body) = tail.strip_prefix('{') {
                let end = body
                    .find('}')
                    .ok_or_else(|| Error::evaluation(raw, "unterminated placeholder"))?;
                out.push_str(&self.lookup(raw, body[..end].trim())?);
                rest = &body[end + 1..];
            } else {
                out.push('$');
                rest = tail;
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn lookup(&self, raw: &str, key: &str) -> Result<String> {
        match key {
            "basedir" | "project.basedir" => Ok(self.base_dir.to_string_lossy().into_owned()),
            "unit.name" => Ok(self.unit_name.clone()),
            "output_dir" => self
                .output_dir
                .as_ref()
                .map(|dir| dir.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::evaluation(raw, "${output_dir} can't be used in the output directory itself")
                }),
            _ => match key.strip_prefix("env.") {
                Some(name) => self.env.get(name).cloned().ok_or_else(|| {
                    Error::evaluation(raw, format!("environment variable {name} is not set"))
                }),
                None => Err(Error::evaluation(raw, format!("unknown placeholder ${{{key}}}"))),
            },
        }
    }

    /// Expand `raw` and align a relative result to the base directory.
    pub fn evaluate_dir(&self, raw: &str) -> Result<PathBuf> {
        let expanded = self.expand(raw)?;
        Ok(self.base_dir.join(expanded))
    }

    /// Expand `raw` and read it as a boolean. `None` when the result is
    /// neither `true` nor `false` (case-insensitive).
    pub fn evaluate_bool(&self, raw: &str) -> Result<Option<bool>> {
        let expanded = self.expand(raw)?;
        Ok(match expanded.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        })
    }

    /// Apply override precedence to decide whether generation is forced.
    ///
    /// A present `override_value` wins over the unit's own setting. A value
    /// that can't be evaluated to a boolean logs a warning and forces.
    #[must_use]
    pub fn resolve_force(&self, override_value: Option<&str>, unit_force: Option<&FlagSetting>) -> bool {
        if let Some(raw) = override_value {
            return self.flag_value(raw, FORCE_ENV, true);
        }
        match unit_force {
            None => false,
            Some(FlagSetting::Flag(flag)) => *flag,
            Some(FlagSetting::Expression(raw)) => self.flag_value(raw, "force", true),
        }
    }

    /// Whether the unit is switched off by its `skip` setting.
    ///
    /// A value that can't be evaluated to a boolean logs a warning and the
    /// unit runs.
    #[must_use]
    pub fn resolve_skip(&self, unit_skip: Option<&FlagSetting>) -> bool {
        match unit_skip {
            None => false,
            Some(FlagSetting::Flag(flag)) => *flag,
            Some(FlagSetting::Expression(raw)) => self.flag_value(raw, "skip", false),
        }
    }

    fn flag_value(&self, raw: &str, source: &str, fallback: bool) -> bool {
        match self.evaluate_bool(raw) {
            Ok(Some(flag)) => flag,
            Ok(None) => {
                tracing::warn!(
                    unit = %self.unit_name,
                    source,
                    value = raw,
                    assumed = fallback,
                    "Couldn't parse {source} value, expecting boolean"
                );
                fallback
            }
            Err(e) => {
                tracing::warn!(
                    unit = %self.unit_name,
                    source,
                    value = raw,
                    assumed = fallback,
                    error = %e,
                    "Couldn't evaluate {source} value"
                );
                fallback
            }
        }
    }
}

impl PathEvaluator for ProjectEvaluator {
    fn evaluate_path(&self, raw: &str) -> Result<String> {
        let expanded = self.expand(raw)?;
        if Path::new(&expanded).is_absolute() {
            Ok(expanded)
        } else {
            Ok(self.base_dir.join(expanded).to_string_lossy().into_owned())
        }
    }
}

/// Override value from the command line or the environment; `--force` wins.
#[must_use]
pub fn force_override(cli_force: bool, env: &EnvMap) -> Option<String> {
    if cli_force {
        Some("true".to_string())
    } else {
        env.get(FORCE_ENV).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator(env: &[(&str, &str)]) -> ProjectEvaluator {
        let env = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ProjectEvaluator::new("/work/db", "db", Arc::new(env))
    }

    #[test]
    fn expands_known_placeholders() {
        let ev = evaluator(&[("SCHEMA", "main")]).with_output_dir("/work/db/out");
        assert_eq!(
            ev.expand("${basedir}/schema/${env.SCHEMA}/*.sql").unwrap(),
            "/work/db/schema/main/*.sql"
        );
        assert_eq!(ev.expand("${project.basedir}").unwrap(), "/work/db");
        assert_eq!(ev.expand("${unit.name}-${output_dir}").unwrap(), "db-/work/db/out");
    }

    #[test]
    fn dollar_escapes_and_stray_dollars() {
        let ev = evaluator(&[]);
        assert_eq!(ev.expand("cost $$5").unwrap(), "cost $5");
        assert_eq!(ev.expand("a$b$").unwrap(), "a$b$");
        assert_eq!(ev.expand("$${basedir}").unwrap(), "${basedir}");
    }

    #[test]
    fn unknown_and_unterminated_placeholders_fail() {
        let ev = evaluator(&[]);
        assert!(matches!(
            ev.expand("${nope}").unwrap_err(),
            Error::Evaluation { .. }
        ));
        assert!(ev.expand("${basedir").is_err());
        assert!(ev.expand("${env.MISSING}").is_err());
        // not yet known while the output directory itself is evaluated
        assert!(ev.expand("${output_dir}").is_err());
    }

    #[test]
    fn paths_are_aligned_to_base_dir() {
        let ev = evaluator(&[]);
        assert_eq!(
            ev.evaluate_path("schema/*.sql").unwrap(),
            Path::new("/work/db").join("schema/*.sql").to_string_lossy()
        );
        assert_eq!(ev.evaluate_path("/abs/x.sql").unwrap(), "/abs/x.sql");
        assert_eq!(
            ev.evaluate_dir("out").unwrap(),
            Path::new("/work/db").join("out")
        );
    }

    #[test]
    fn booleans() {
        let ev = evaluator(&[("FLAG", "TRUE")]);
        assert_eq!(ev.evaluate_bool("${env.FLAG}").unwrap(), Some(true));
        assert_eq!(ev.evaluate_bool(" false ").unwrap(), Some(false));
        assert_eq!(ev.evaluate_bool("yes").unwrap(), None);
    }

    #[test]
    fn override_wins_over_unit_setting() {
        let ev = evaluator(&[]);
        assert!(!ev.resolve_force(Some("false"), Some(&FlagSetting::Flag(true))));
        assert!(ev.resolve_force(Some("true"), Some(&FlagSetting::Flag(false))));
        assert!(ev.resolve_force(None, Some(&FlagSetting::Flag(true))));
        assert!(!ev.resolve_force(None, None));
    }

    #[test]
    fn unparsable_force_values_force() {
        let ev = evaluator(&[]);
        assert!(ev.resolve_force(Some("maybe"), None));
        assert!(ev.resolve_force(None, Some(&FlagSetting::Expression("sometimes".into()))));
        assert!(ev.resolve_force(None, Some(&FlagSetting::Expression("${env.UNSET}".into()))));
    }

    #[test]
    fn skip_setting() {
        let ev = evaluator(&[("OFF", "true")]);
        assert!(!ev.resolve_skip(None));
        assert!(ev.resolve_skip(Some(&FlagSetting::Flag(true))));
        assert!(ev.resolve_skip(Some(&FlagSetting::Expression("${env.OFF}".into()))));
        assert!(!ev.resolve_skip(Some(&FlagSetting::Expression("FALSE".into()))));
    }

    #[test]
    fn unparsable_skip_values_run_the_unit() {
        let ev = evaluator(&[]);
        assert!(!ev.resolve_skip(Some(&FlagSetting::Expression("sometimes".into()))));
        assert!(!ev.resolve_skip(Some(&FlagSetting::Expression("${env.UNSET}".into()))));
    }

    #[test]
    fn cli_flag_beats_environment() {
        let env = EnvMap::from([(FORCE_ENV.to_string(), "false".to_string())]);
        assert_eq!(force_override(true, &env).as_deref(), Some("true"));
        assert_eq!(force_override(false, &env).as_deref(), Some("false"));
        assert_eq!(force_override(false, &EnvMap::new()), None);
    }
}
