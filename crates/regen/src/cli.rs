use crate::commands::Command;
use crate::config::CONFIG_FILE_NAME;
use crate::tracing::TracingFormat;
use clap::{Args, Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// A generator or the staleness check failed
pub const EXIT_GENERATION: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(regen::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Generation failure (exit code 1)
    #[error("Generation failed: {message}")]
    #[diagnostic(code(regen::cli::generation))]
    Generation {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Other unexpected error (exit code 1)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(regen::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new generation error with help text
    #[must_use]
    pub fn generation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }
}

/// Map staleness-engine errors onto CLI categories:
/// - configuration and expression errors -> Config (exit code 2)
/// - unreadable inputs -> Generation (exit code 1)
/// - everything else -> Other (exit code 1)
impl From<regen_cache::Error> for CliError {
    fn from(err: regen_cache::Error) -> Self {
        match err {
            // Avoid "Configuration error: Configuration error:"
            regen_cache::Error::Configuration { message } => Self::config(message),
            regen_cache::Error::Evaluation { .. } => Self::config_with_help(
                err.to_string(),
                "Check placeholder names and referenced environment variables",
            ),
            regen_cache::Error::InputUnreadable { .. } => Self::generation_with_help(
                err.to_string(),
                "Every file matched by the input patterns must exist and be readable",
            ),
            regen_cache::Error::Io { .. }
            | regen_cache::Error::UnitAlreadyPending { .. }
            | regen_cache::Error::Serialization { .. } => Self::other(err.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Generation { .. } | CliError::Other { .. } => EXIT_GENERATION,
    }
}

/// Code and message of `err` for a JSON error envelope
#[must_use]
pub fn error_details(err: &CliError) -> serde_json::Value {
    serde_json::json!({
        "code": match err {
            CliError::Config { .. } => "config",
            CliError::Generation { .. } => "generation",
            CliError::Other { .. } => "other",
        },
        "message": err.to_string()
    })
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(error_details(err));

        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope<E, T = ()> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
    /// Partial results of a command that ran but failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
            data: None,
        }
    }
}

impl<E, T> ErrorEnvelope<E, T> {
    /// Create an error envelope carrying partial results
    #[must_use]
    pub const fn with_data(error: E, data: T) -> Self {
        Self {
            status: "error",
            error,
            data: Some(data),
        }
    }
}

/// Main CLI entry point for regen.
///
/// Runs code generators only when their inputs or configuration changed.
#[derive(Parser, Debug)]
#[command(name = "regen")]
#[command(about = "Run code generators only when their inputs or configuration changed")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "info",
        value_enum
    )]
    pub level: crate::tracing::LogLevel,

    /// Log output format; `--json` implies `json`.
    #[arg(
        long = "log-format",
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    /// Emit JSON logs and a JSON report.
    #[arg(long, global = true, help = "Emit JSON logs and a JSON report")]
    pub json: bool,
}

impl Cli {
    /// Log format after applying `--json`.
    #[must_use]
    pub const fn tracing_format(&self) -> TracingFormat {
        if self.json {
            TracingFormat::Json
        } else {
            self.log_format
        }
    }
}

/// Which configuration file and units a command applies to
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Path to the project configuration.
    #[arg(
        long,
        short = 'c',
        help = "Path to the project configuration",
        default_value = CONFIG_FILE_NAME
    )]
    pub config: PathBuf,

    /// Units to act on; all units when omitted.
    #[arg(
        long = "unit",
        short = 'u',
        value_name = "UNIT",
        help = "Unit to act on (repeatable); all units when omitted"
    )]
    pub units: Vec<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run generators whose outputs are stale.
    #[command(about = "Run generators whose outputs are stale")]
    Run {
        /// Configuration and unit selection.
        #[command(flatten)]
        target: TargetArgs,
        /// Regenerate regardless of recorded checksums.
        #[arg(long, help = "Regenerate regardless of recorded checksums")]
        force: bool,
        /// Number of units generated in parallel.
        #[arg(
            long,
            short = 'j',
            value_name = "N",
            help = "Number of units generated in parallel (default: number of CPUs)"
        )]
        jobs: Option<usize>,
    },
    /// Show whether each unit is up to date.
    #[command(about = "Show whether each unit is up to date, without running anything")]
    Status {
        /// Configuration and unit selection.
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Remove checksum records.
    #[command(about = "Remove checksum records so the next run regenerates")]
    Clean {
        /// Configuration and unit selection.
        #[command(flatten)]
        target: TargetArgs,
    },
}

impl Commands {
    /// Convert the parsed arguments into an executable command.
    #[must_use]
    pub fn into_command(self) -> Command {
        match self {
            Self::Run {
                target,
                force,
                jobs,
            } => Command::Run {
                config: target.config,
                units: target.units,
                force,
                jobs,
            },
            Self::Status { target } => Command::Status {
                config: target.config,
                units: target.units,
            },
            Self::Clean { target } => Command::Clean {
                config: target.config,
                units: target.units,
            },
        }
    }
}

/// Parse command-line arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
