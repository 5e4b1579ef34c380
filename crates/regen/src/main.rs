//! regen CLI application

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use regen::cli::{self, EXIT_OK, exit_code_for, render_error};
use regen::commands;
use regen::tracing::{TracingConfig, init_tracing};

fn main() {
    // Tracing may not be usable while panicking
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.tracing_format(),
        level: cli.level.into(),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("{e:?}");
    }

    let json = cli.json;
    let exit_code = match commands::execute(cli.command.into_command(), json) {
        Ok(output) => {
            print!("{}", output.report);
            match output.error {
                // the JSON report already is the error envelope
                Some(err) => {
                    if !json {
                        render_error(&err, false);
                    }
                    exit_code_for(&err)
                }
                None => EXIT_OK,
            }
        }
        Err(err) => {
            render_error(&err, json);
            exit_code_for(&err)
        }
    };
    std::process::exit(exit_code);
}
