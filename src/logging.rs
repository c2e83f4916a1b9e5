//! Logging setup for dupsort.
//!
//! Uses the `log` facade with the `env_logger` backend. The level comes from,
//! in priority order:
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. CLI flags: `--quiet` (error only) or `--verbose` (debug/trace)
//! 3. Default: info level
//!
//! Log output always goes to stderr, so it never mixes with a report on
//! stdout. Debug builds prefix each line with a timestamp and, at `-v` and
//! above, the module path. Release builds print level and message only.
//!
//! # Example
//!
//! ```rust,no_run
//! use dupsort::logging::init_logging;
//!
//! // -vv: trace, with module paths in debug builds
//! init_logging(2, false);
//! log::trace!("Per-file detail");
//! ```

use std::env;
use std::io::Write;

use env_logger::{Builder, Target};
use log::LevelFilter;

/// Initialize logging from the CLI verbosity flags.
///
/// Call once, before anything logs. Later calls are ignored.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from CLI (0=info, 1=debug, 2+=trace)
/// * `quiet` - If true, only show errors (overridden by `RUST_LOG`)
pub fn init_logging(verbose: u8, quiet: bool) {
    let use_env = env::var_os("RUST_LOG").is_some();

    let mut builder = Builder::new();
    builder.target(Target::Stderr);
    if use_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }
    configure_format(&mut builder, verbose);

    if builder.try_init().is_err() {
        return;
    }

    if use_env {
        log::debug!("Logging initialized from RUST_LOG");
    } else {
        log::debug!(
            "Logging initialized at level: {:?}",
            determine_level(verbose, quiet)
        );
    }
}

/// Map CLI flags to a level filter.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        let timestamp = buf.timestamp_seconds();
        if verbose >= 1 {
            writeln!(
                buf,
                "{timestamp} {style}{level:<5}{style:#} [{}] {}",
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        } else {
            writeln!(buf, "{timestamp} {style}{level:<5}{style:#} {}", record.args())
        }
    });

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            writeln!(buf, "{style}{level:<5}{style:#} {}", record.args())
        });
    }
}
