//! Feature-gate probe
//!
//! Connects to the config API, starts the accessor and its informers in the
//! background and waits, bounded, for the first snapshot.

use crate::access::FeatureGateAccess;
use crate::error::FeatureGateError;
use crate::informers::ConfigInformers;
use kube::{Client, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Release version reported by development builds. When the process runs with
/// this version, the gates are resolved against the cluster's own version.
pub const MISSING_VERSION: &str = "0.0.1-snapshot";

/// How long to wait for the first feature-gate snapshot.
pub const FEATURE_GATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Resync period of the config informers.
pub const CONFIG_RESYNC_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Starts feature-gate observation for `desired_version` and waits up to
/// [`FEATURE_GATE_TIMEOUT`] for the first snapshot.
///
/// The accessor and informer tasks keep running until `lifetime` is cancelled.
pub async fn probe(
    config: &Config,
    desired_version: &str,
    lifetime: &CancellationToken,
) -> Result<Arc<FeatureGateAccess>, FeatureGateError> {
    let access = Arc::new(FeatureGateAccess::new(desired_version, MISSING_VERSION));
    probe_with(config, access, FEATURE_GATE_TIMEOUT, lifetime).await
}

/// Like [`probe`], with a caller-supplied accessor and deadline.
pub async fn probe_with(
    config: &Config,
    access: Arc<FeatureGateAccess>,
    timeout: Duration,
    lifetime: &CancellationToken,
) -> Result<Arc<FeatureGateAccess>, FeatureGateError> {
    let client = Client::try_from(config.clone()).map_err(FeatureGateError::Client)?;

    let informers = ConfigInformers::new(client, CONFIG_RESYNC_PERIOD);
    let handles = informers.handles();

    {
        let access = Arc::clone(&access);
        let cancel = lifetime.clone();
        tokio::spawn(async move { access.run(handles, cancel).await });
    }
    tokio::spawn(informers.start(lifetime.clone()));

    wait_for_initial_feature_gates(&access, timeout, lifetime).await?;

    let gates = access.current_feature_gates()?;
    info!("FeatureGates initialized: {:?}", gates.known_features());
    Ok(access)
}

/// Waits for the accessor's first snapshot, failing with
/// [`FeatureGateError::TimedOut`] once `timeout` has elapsed.
pub async fn wait_for_initial_feature_gates(
    access: &FeatureGateAccess,
    timeout: Duration,
    lifetime: &CancellationToken,
) -> Result<(), FeatureGateError> {
    tokio::select! {
        () = access.initial_feature_gates_observed() => Ok(()),
        () = tokio::time::sleep(timeout) => Err(FeatureGateError::TimedOut),
        () = lifetime.cancelled() => Err(FeatureGateError::Cancelled),
    }
}
