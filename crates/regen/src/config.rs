//! Project configuration
//!
//! Loaded from `regen.toml`: one `[[unit]]` table per build unit.

use regen_cache::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file looked up when no path is given.
pub const CONFIG_FILE_NAME: &str = "regen.toml";

/// Output directory used when a unit doesn't declare one.
pub const DEFAULT_OUTPUT_DIR: &str = "target/generated-sources/regen";

/// Top-level `regen.toml` structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Build units in declaration order
    #[serde(default, rename = "unit")]
    pub units: Vec<UnitConfig>,
}

/// One build unit and the generator it wraps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UnitConfig {
    /// Unique unit name
    pub name: String,

    /// Base directory, relative to the configuration file
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Ordered input patterns
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Per-unit force flag: a boolean or an expression evaluating to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<FlagSetting>,

    /// Switches the unit off entirely; same forms as `force`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<FlagSetting>,

    /// Generator output directory, relative to `root` unless absolute
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Generator executable
    pub command: String,

    /// Generator arguments; placeholders are expanded
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra generator environment; values are expanded
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Value of a unit's `force` or `skip` key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FlagSetting {
    /// Literal boolean
    Flag(bool),
    /// Expression evaluated at build time
    Expression(String),
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

/// A parsed and validated configuration together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Directory unit roots are resolved against
    pub project_dir: PathBuf,
    /// The configuration itself
    pub config: ProjectConfig,
}

impl ProjectConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Invalid {CONFIG_FILE_NAME}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the configuration file at `path`.
    ///
    /// The project directory is made absolute so that evaluated paths stay
    /// valid inside generators running from a unit root.
    pub fn load(path: &Path) -> Result<LoadedConfig> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        let config = Self::from_toml_str(&content)?;

        let path = std::path::absolute(path).map_err(|e| Error::io(e, path, "resolve"))?;
        let project_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
        tracing::debug!(
            path = %path.display(),
            units = config.units.len(),
            "Loaded project configuration"
        );

        Ok(LoadedConfig {
            project_dir,
            config,
        })
    }

    /// Check names and commands; warn about units sharing an output directory.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut outputs: HashMap<PathBuf, &str> = HashMap::new();

        for (index, unit) in self.units.iter().enumerate() {
            if unit.name.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "unit #{} has an empty name",
                    index + 1
                )));
            }
            if seen.insert(unit.name.as_str(), index).is_some() {
                return Err(Error::configuration(format!(
                    "unit '{}' is declared more than once",
                    unit.name
                )));
            }
            if unit.command.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "unit '{}' has an empty command",
                    unit.name
                )));
            }

            // Only literal directories can be compared before evaluation
            let output = unit.root.join(&unit.output_dir);
            if let Some(other) = outputs.insert(output.clone(), unit.name.as_str()) {
                tracing::warn!(
                    output = %output.display(),
                    first = other,
                    second = %unit.name,
                    "Units share an output directory, their checksum records will overwrite each other"
                );
            }
        }

        if self.units.is_empty() {
            tracing::warn!("No units are configured");
        }
        Ok(())
    }

    /// Units named in `names`, in declaration order; all units when `names`
    /// is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<&UnitConfig>> {
        if let Some(unknown) = names
            .iter()
            .find(|name| !self.units.iter().any(|unit| &unit.name == *name))
        {
            return Err(Error::configuration(format!("unknown unit '{unknown}'")));
        }
        Ok(self
            .units
            .iter()
            .filter(|unit| names.is_empty() || names.contains(&unit.name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[unit]]
name = "db"
root = "services/db"
inputs = ["${basedir}/schema/*.sql"]
command = "sqlgen"
args = ["--out", "${output_dir}"]
env = { MODE = "strict" }

[[unit]]
name = "api"
inputs = ["api/**.proto"]
force = "${env.FORCE_API}"
output_dir = "gen"
command = "protogen"
"#;

    #[test]
    fn parses_units_with_defaults() {
        let config = ProjectConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.units.len(), 2);

        let db = &config.units[0];
        assert_eq!(db.root, PathBuf::from("services/db"));
        assert_eq!(db.output_dir, DEFAULT_OUTPUT_DIR);
        assert_eq!(db.force, None);
        assert_eq!(db.env.get("MODE").map(String::as_str), Some("strict"));

        let api = &config.units[1];
        assert_eq!(api.root, PathBuf::from("."));
        assert_eq!(
            api.force,
            Some(FlagSetting::Expression("${env.FORCE_API}".to_string()))
        );
        assert!(api.args.is_empty());
    }

    #[test]
    fn force_accepts_boolean() {
        let config = ProjectConfig::from_toml_str(
            "[[unit]]\nname = \"a\"\ncommand = \"x\"\nforce = true\n",
        )
        .unwrap();
        assert_eq!(config.units[0].force, Some(FlagSetting::Flag(true)));
    }

    #[test]
    fn skip_accepts_boolean_or_expression() {
        let config = ProjectConfig::from_toml_str(
            "[[unit]]\nname = \"a\"\ncommand = \"x\"\nskip = true\n\n[[unit]]\nname = \"b\"\ncommand = \"x\"\nskip = \"${env.SKIP_B}\"\n",
        )
        .unwrap();
        assert_eq!(config.units[0].skip, Some(FlagSetting::Flag(true)));
        assert_eq!(
            config.units[1].skip,
            Some(FlagSetting::Expression("${env.SKIP_B}".to_string()))
        );
        assert_eq!(ProjectConfig::from_toml_str(SAMPLE).unwrap().units[0].skip, None);
    }

    #[test]
    fn empty_file_has_no_units() {
        assert!(ProjectConfig::from_toml_str("").unwrap().units.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ProjectConfig::from_toml_str(
            "[[unit]]\nname = \"a\"\ncommand = \"x\"\n[[unit]]\nname = \"a\"\ncommand = \"y\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err =
            ProjectConfig::from_toml_str("[[unit]]\nname = \"a\"\ncommand = \" \"\n").unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ProjectConfig::from_toml_str(
            "[[unit]]\nname = \"a\"\ncommand = \"x\"\ninput = []\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn select_keeps_declaration_order() {
        let config = ProjectConfig::from_toml_str(SAMPLE).unwrap();
        let picked = config
            .select(&["api".to_string(), "db".to_string()])
            .unwrap();
        let names: Vec<&str> = picked.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["db", "api"]);

        assert_eq!(config.select(&[]).unwrap().len(), 2);
        assert!(config.select(&["nope".to_string()]).is_err());
    }

    #[test]
    fn load_resolves_project_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();

        let loaded = ProjectConfig::load(&path).unwrap();
        assert_eq!(loaded.project_dir, tmp.path());
        assert_eq!(loaded.config.units.len(), 2);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = ProjectConfig::load(&tmp.path().join(CONFIG_FILE_NAME)).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
