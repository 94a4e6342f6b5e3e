//! Machine API Migration Controller
//!
//! Bootstrap for the controllers that move machines between the Machine API and
//! Cluster API:
//! - waits (up to 60 s) for the cluster feature gates of this release
//! - idles until terminated when `MachineAPIMigration` is disabled
//! - otherwise runs the controller manager under Lease-based leader election
//!   in the managed namespace
//!
//! Exits 0 on a clean shutdown or when the feature gates change, 1 on any
//! startup or runtime failure.

mod cli;
mod error;
mod logging;
mod startup;

use clap::Parser;
use cli::Cli;
use std::process::ExitCode;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    // kube's rustls stack needs a process-wide crypto provider.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    match startup::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{} failed: {}", e.stage(), e);
            ExitCode::FAILURE
        }
    }
}
