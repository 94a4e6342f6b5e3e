//! Feature-gate errors

use thiserror::Error;

/// Errors raised while observing cluster feature gates.
#[derive(Debug, Error)]
pub enum FeatureGateError {
    /// The config API client could not be built
    #[error("failed to create config client: {0}")]
    Client(#[source] kube::Error),

    /// No feature-gate snapshot was observed before the deadline
    #[error("timed out waiting for feature gates to be initialized")]
    TimedOut,

    /// The probe was cancelled before a snapshot was observed
    #[error("cancelled while waiting for feature gates to be initialized")]
    Cancelled,

    /// Feature gates were read before the first snapshot was observed
    #[error("feature gates have not been observed yet")]
    NotObserved,

    /// The FeatureGate status carries no entry for the effective release version
    #[error("missing desired version {version:?} in featuregates.config.openshift.io/cluster")]
    MissingVersion {
        /// Release version that was looked up
        version: String,
    },
}
