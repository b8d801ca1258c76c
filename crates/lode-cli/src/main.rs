//! lode CLI binary.
//!
//! This is the entry point for the `lode` command-line tool. It parses
//! arguments with `clap`, initializes logging via `tracing`, dispatches to
//! the command handler and turns failures into process exit codes.

mod cli;
mod commands;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

const LODE_CRATES: &[&str] = &[
    "lode",
    "lode_core",
    "lode_installer",
    "lode_ops",
    "lode_resolver",
    "lode_source",
    "lode_util",
];

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    match commands::dispatch(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            let code = lode_util::errors::exit_code_for(&report);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

/// `RUST_LOG` wins; otherwise warnings only, or debug for lode's own
/// crates with `--verbose`.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            let directives: Vec<String> = LODE_CRATES.iter().map(|c| format!("{c}=debug")).collect();
            EnvFilter::new(format!("warn,{}", directives.join(",")))
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
