//! Error types for the staleness engine

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for staleness detection and record bookkeeping
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error while walking directories or touching the sidecar record
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(regen::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "walk")
        operation: String,
    },

    /// An input file could not be read while computing the checksum
    #[error("Couldn't read input {} while calculating the checksum", path.display())]
    #[diagnostic(
        code(regen::cache::input_unreadable),
        help("Every file matched by the input patterns must exist and be readable")
    )]
    InputUnreadable {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Input path as it appears in the resolved input set
        path: Box<Path>,
    },

    /// Configuration or pattern error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(regen::cache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Expression evaluation failed for an input pattern
    #[error("Failed to evaluate '{expression}': {message}")]
    #[diagnostic(
        code(regen::cache::evaluation),
        help("Check placeholder names and referenced environment variables")
    )]
    Evaluation {
        /// The raw expression handed to the evaluator
        expression: String,
        /// Error message from the evaluator
        message: String,
    },

    /// A build unit already has live execution state
    #[error("Build unit '{unit}' is already being generated")]
    #[diagnostic(
        code(regen::cache::unit_pending),
        help("Each build unit must reach success or failure before it is started again")
    )]
    UnitAlreadyPending {
        /// Identity of the build unit
        unit: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(regen::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an input-unreadable error
    #[must_use]
    pub fn input_unreadable(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::InputUnreadable {
            source,
            path: path.as_ref().into(),
        }
    }

    /// Create an evaluation error
    #[must_use]
    pub fn evaluation(expression: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

/// Result type for staleness operations
pub type Result<T> = std::result::Result<T, Error>;
