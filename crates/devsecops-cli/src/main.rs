//! devsecops-api - provision DevSecOps workshop services from the command line.
//!
//! Seeds Quay, Nexus and SonarQube instances with users, organizations,
//! repositories and settings. Every command is safe to re-run: items that
//! already exist are reported as `ok`.

mod cli;
mod commands;
mod output;

use std::io;
use std::path::Path;
use std::process;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::FATAL_EXIT_CODE;

/// Log level for `-v` repetitions; `RUST_LOG` overrides it.
fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    }
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must outlive the
/// command.
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbose)));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::INFO);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_filter(filter))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = cli::parse();

    let guard = match init_tracing(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: failed to open log file: {err}");
            process::exit(FATAL_EXIT_CODE);
        }
    };
    info!(version = env!("CARGO_PKG_VERSION"), "devsecops-api starting");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start async runtime: {err}");
            process::exit(FATAL_EXIT_CODE);
        }
    };

    let exit_code = runtime.block_on(cli::run(cli));

    // process::exit skips destructors; flush the log file first
    drop(runtime);
    drop(guard);
    process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for_verbosity(0), "error");
        assert_eq!(level_for_verbosity(1), "warn");
        assert_eq!(level_for_verbosity(2), "info");
        assert_eq!(level_for_verbosity(3), "debug");
        assert_eq!(level_for_verbosity(9), "debug");
    }
}
