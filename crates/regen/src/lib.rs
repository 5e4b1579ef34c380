//! regen: run code generators only when their inputs or configuration changed
//!
//! The host side of the staleness guard in [`regen_cache`]:
//! - [`config`] reads `regen.toml`
//! - [`expr`] evaluates placeholders and the force override
//! - [`host`] runs one unit's generator between the guard's call points
//! - [`commands`] implements `run`, `status` and `clean`

// TODO(docs): Add # Errors sections once the command API settles
#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod expr;
pub mod host;
pub mod tracing;
