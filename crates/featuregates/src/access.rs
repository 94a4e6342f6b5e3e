//! Feature-gate accessor
//!
//! [`FeatureGateAccess`] resolves the gate set for the running release from the
//! cached `ClusterVersion` and `FeatureGate` objects. It is driven by
//! [`FeatureGateAccess::run`], which re-evaluates on every informer event and
//! resync tick.

use crate::error::FeatureGateError;
use crate::informers::ConfigInformerHandles;
use crate::snapshot::{FeatureChange, FeatureGateSnapshot};
use crds::{ClusterVersion, FeatureGate, CLUSTER_VERSION_NAME, FEATURE_GATE_NAME};
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callback invoked when the resolved gates change after the first observation.
pub type FeatureChangeHandler = Arc<dyn Fn(&FeatureChange) + Send + Sync>;

/// Default change policy: exit successfully so the supervisor restarts the
/// process with the new gates.
pub fn force_exit(change: &FeatureChange) {
    info!(
        "Exiting because feature gates changed: turned on {:?}, turned off {:?}",
        change.turned_on(),
        change.turned_off()
    );
    std::process::exit(0);
}

/// Result of one evaluation of the cached config objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The objects needed to resolve the gates are not cached yet
    Pending,

    /// The first snapshot was published
    Initialized,

    /// The gates match the ones already published; the snapshot is
    /// republished in case the version moved
    Unchanged,

    /// The snapshot differs from the published one; the change handler ran
    Changed,
}

/// Tracks the feature gates of the running release.
pub struct FeatureGateAccess {
    desired_version: String,
    missing_version: String,
    current: watch::Sender<Option<FeatureGateSnapshot>>,
    change_handler: FeatureChangeHandler,
}

impl FeatureGateAccess {
    /// Creates an accessor for `desired_version` using the [`force_exit`] change policy.
    ///
    /// When `desired_version` equals `missing_version` the process does not know
    /// its own release, and the version reported by `ClusterVersion/version` is
    /// used instead.
    pub fn new(desired_version: impl Into<String>, missing_version: impl Into<String>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            desired_version: desired_version.into(),
            missing_version: missing_version.into(),
            current,
            change_handler: Arc::new(force_exit),
        }
    }

    /// Replaces the change policy.
    #[must_use]
    pub fn with_change_handler(mut self, handler: FeatureChangeHandler) -> Self {
        self.change_handler = handler;
        self
    }

    /// Whether the first snapshot has been published.
    pub fn are_initial_feature_gates_observed(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Completes once the first snapshot has been published.
    pub async fn initial_feature_gates_observed(&self) {
        let mut rx = self.current.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        if rx.wait_for(Option::is_some).await.is_err() {
            debug!("feature gate channel closed");
        }
    }

    /// The most recently published snapshot.
    pub fn current_feature_gates(&self) -> Result<FeatureGateSnapshot, FeatureGateError> {
        self.current
            .borrow()
            .clone()
            .ok_or(FeatureGateError::NotObserved)
    }

    /// Evaluates the cached objects and publishes the resolved snapshot.
    pub fn sync(
        &self,
        cluster_version: Option<&ClusterVersion>,
        feature_gate: Option<&FeatureGate>,
    ) -> Result<SyncOutcome, FeatureGateError> {
        let version = if self.desired_version == self.missing_version {
            let Some(cluster_version) = cluster_version else {
                debug!("ClusterVersion {} not cached yet", CLUSTER_VERSION_NAME);
                return Ok(SyncOutcome::Pending);
            };
            match cluster_version.desired_version() {
                Some(version) => version.to_string(),
                None => {
                    debug!("ClusterVersion {} reports no desired version yet", CLUSTER_VERSION_NAME);
                    return Ok(SyncOutcome::Pending);
                }
            }
        } else {
            self.desired_version.clone()
        };

        let Some(feature_gate) = feature_gate else {
            debug!("FeatureGate {} not cached yet", FEATURE_GATE_NAME);
            return Ok(SyncOutcome::Pending);
        };

        let details = feature_gate
            .details_for_version(&version)
            .ok_or_else(|| FeatureGateError::MissingVersion {
                version: version.clone(),
            })?;
        let snapshot = FeatureGateSnapshot::from_details(details);

        let previous = self.current.send_replace(Some(snapshot.clone()));
        match previous {
            None => {
                info!("Feature gates observed for version {}", version);
                Ok(SyncOutcome::Initialized)
            }
            Some(previous) if previous.same_gates(&snapshot) => {
                if previous.version() != snapshot.version() {
                    debug!(
                        "Feature gates unchanged across versions {} -> {}",
                        previous.version(),
                        snapshot.version()
                    );
                }
                Ok(SyncOutcome::Unchanged)
            }
            Some(previous) => {
                let change = FeatureChange {
                    previous,
                    new: snapshot,
                };
                warn!("Feature gates changed: {}", change.new);
                (self.change_handler)(&change);
                Ok(SyncOutcome::Changed)
            }
        }
    }

    /// Re-evaluates the cached objects whenever the informers report activity,
    /// until `cancel` fires.
    pub async fn run(&self, informers: ConfigInformerHandles, cancel: CancellationToken) {
        info!("Starting feature gate accessor");
        let cluster_version_ref = ObjectRef::<ClusterVersion>::new(CLUSTER_VERSION_NAME);
        let feature_gate_ref = ObjectRef::<FeatureGate>::new(FEATURE_GATE_NAME);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Stopping feature gate accessor");
                    return;
                }
                () = informers.changed.notified() => {}
            }

            let cluster_version = informers.cluster_versions.get(&cluster_version_ref);
            let feature_gate = informers.feature_gates.get(&feature_gate_ref);
            if let Err(e) = self.sync(cluster_version.as_deref(), feature_gate.as_deref()) {
                warn!("Unable to resolve feature gates: {}", e);
            }
        }
    }
}
