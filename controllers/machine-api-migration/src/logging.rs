//! Logging setup.
//!
//! `-v` and `--vmodule` use klog numbering and are mapped onto tracing levels.
//! `RUST_LOG`, when set, replaces both.

use crate::cli::Cli;
use crate::error::BootstrapError;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Tracing level for a klog verbosity.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1..=4 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Filter directives for `-v` and `--vmodule`.
pub fn directives(verbosity: u8, vmodule: &str) -> Result<String, BootstrapError> {
    let mut directives = vec![level_for(verbosity).to_string().to_lowercase()];
    for entry in vmodule.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (target, level) = entry
            .split_once('=')
            .ok_or_else(|| BootstrapError::Logging(format!("invalid vmodule entry {entry:?}")))?;
        let level: u8 = level
            .parse()
            .map_err(|_| BootstrapError::Logging(format!("invalid vmodule level in {entry:?}")))?;
        directives.push(format!(
            "{}={}",
            target.replace('-', "_"),
            level_for(level).to_string().to_lowercase()
        ));
    }
    Ok(directives.join(","))
}

/// Installs the global subscriber.
pub fn init(cli: &Cli) -> Result<(), BootstrapError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directives(cli.verbosity, &cli.vmodule)?)
            .map_err(|e| BootstrapError::Logging(e.to_string()))?,
    };
    let writer = if cli.logtostderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init()
        .map_err(|e| BootstrapError::Logging(e.to_string()))
}
