//! Conditional startup.
//!
//! The manager only runs when the `MachineAPIMigration` feature gate is
//! enabled for this release. Otherwise the process idles until it is told to
//! terminate, so that it can be deployed unconditionally.

use crate::cli::Cli;
use crate::error::BootstrapError;
use crds::{Machine, MachineSet, FEATURE_GATE_MACHINE_API_MIGRATION};
use featuregates::{FeatureGateError, FeatureGateSnapshot};
use manager::{
    healthz, setup_signal_handler, CacheOptions, Manager, ManagerOptions, Scheme, ShutdownSignal,
};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Resync period of the manager's object cache.
pub const CACHE_SYNC_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Where the bootstrap is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPhase {
    Init,
    Configured,
    ProbeWaiting,
    Idle,
    Running,
    Terminated,
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "Init",
            Self::Configured => "Configured",
            Self::ProbeWaiting => "ProbeWaiting",
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

fn enter(phase: StartupPhase) {
    info!("Startup phase: {}", phase);
}

/// Kinds the manager caches: the machine API v1beta1 group.
pub fn init_scheme() -> Scheme {
    let mut scheme = Scheme::new();
    scheme.add::<Machine>().add::<MachineSet>();
    scheme
}

/// Manager settings derived from the flags.
pub fn manager_options(cli: &Cli, scheme: Scheme) -> ManagerOptions {
    ManagerOptions {
        scheme,
        cache: CacheOptions::single_namespace(cli.namespace.clone(), CACHE_SYNC_PERIOD),
        leader_election: cli.leader_election.to_config(),
        health_probe_bind_address: cli.health_addr.clone(),
        metrics_bind_address: cli.metrics_bind_addr.clone(),
    }
}

/// Runs the bootstrap to completion.
pub async fn run(cli: Cli) -> Result<(), BootstrapError> {
    enter(StartupPhase::Init);
    info!("Release version: {}", cli.release_version);
    info!("Managed namespace: {}", cli.namespace);

    let scheme = init_scheme();
    let config = kube::Config::infer().await?;
    let manager = Manager::new(config, manager_options(&cli, scheme))
        .map_err(BootstrapError::ManagerConstruction)?;
    let shutdown = setup_signal_handler().map_err(BootstrapError::Signal)?;
    enter(StartupPhase::Configured);

    enter(StartupPhase::ProbeWaiting);
    // Probe tasks live until shutdown; they keep watching for gate changes.
    let lifetime = shutdown.child_token();
    let access = match featuregates::probe(manager.config(), &cli.release_version, &lifetime).await
    {
        Ok(access) => access,
        Err(FeatureGateError::Cancelled) => {
            info!("Shutdown requested while waiting for feature gates");
            enter(StartupPhase::Terminated);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let gates = access
        .current_feature_gates()
        .map_err(BootstrapError::FeatureGateRead)?;

    run_with_gates(&gates, manager, shutdown).await
}

/// Idles or runs the manager depending on `gates`.
pub async fn run_with_gates(
    gates: &FeatureGateSnapshot,
    mut manager: Manager,
    shutdown: ShutdownSignal,
) -> Result<(), BootstrapError> {
    if !gates.enabled(FEATURE_GATE_MACHINE_API_MIGRATION) {
        enter(StartupPhase::Idle);
        info!(
            "{} feature gate is not enabled, nothing to do. Waiting for termination signal.",
            FEATURE_GATE_MACHINE_API_MIGRATION
        );
        shutdown.wait().await;
        enter(StartupPhase::Terminated);
        return Ok(());
    }

    register_probes(&mut manager)?;

    enter(StartupPhase::Running);
    info!("starting manager");
    manager
        .start(shutdown)
        .await
        .map_err(BootstrapError::Runtime)?;
    enter(StartupPhase::Terminated);
    Ok(())
}

/// Registers the `health` liveness and `check` readiness probes.
pub fn register_probes(manager: &mut Manager) -> Result<(), BootstrapError> {
    manager
        .add_healthz_check("health", healthz::ping)
        .map_err(BootstrapError::HealthRegistration)?;
    manager
        .add_readyz_check("check", healthz::ping)
        .map_err(BootstrapError::HealthRegistration)?;
    Ok(())
}
