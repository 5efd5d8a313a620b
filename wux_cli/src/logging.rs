//! Logging setup for the `wux` binary.
//!
//! Levels are chosen in priority order:
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. CLI flags: `--quiet` (errors only) or `-v` / `-vv` (debug / trace)
//! 3. Default: info

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Initialize `env_logger` from the CLI verbosity flags.
///
/// Call once, before any logging; a second call is ignored.
pub fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = Builder::new();
    if env::var_os("RUST_LOG").is_some() {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    builder.format(move |buf, record| {
        if verbose > 0 {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.module_path().unwrap_or("wux"),
                record.args()
            )
        } else {
            writeln!(buf, "{:<5} {}", record.level(), record.args())
        }
    });

    let _ = builder.try_init();
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
