//! Bootstrap error types.
//!
//! Every variant is fatal: `main` logs it once and exits with status 1.

use featuregates::FeatureGateError;
use manager::ManagerError;
use thiserror::Error;

/// Errors that stop the bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Logging could not be initialised
    #[error("unable to set up logging: {0}")]
    Logging(String),

    /// No usable cluster configuration was found
    #[error("unable to load cluster config: {0}")]
    Config(#[from] kube::config::InferConfigError),

    /// The manager rejected its options
    #[error("unable to create manager: {0}")]
    ManagerConstruction(#[source] ManagerError),

    /// The termination signal handler could not be installed
    #[error("unable to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    /// No feature-gate snapshot arrived in time
    #[error("{0}")]
    FeatureGateTimeout(#[source] FeatureGateError),

    /// The feature-gate accessor could not be started
    #[error("unable to start feature gate accessor: {0}")]
    FeatureGate(#[source] FeatureGateError),

    /// The feature-gate snapshot could not be read after observation
    #[error("unable to read feature gates: {0}")]
    FeatureGateRead(#[source] FeatureGateError),

    /// A health or readiness check could not be registered
    #[error("unable to set up health check: {0}")]
    HealthRegistration(#[source] ManagerError),

    /// The manager stopped with an error
    #[error("problem running manager: {0}")]
    Runtime(#[source] ManagerError),
}

impl BootstrapError {
    /// Startup stage that failed, for the final log line.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Logging(_) => "logging",
            Self::Config(_) => "config",
            Self::ManagerConstruction(_) => "manager construction",
            Self::Signal(_) => "signal handler",
            Self::FeatureGateTimeout(_) | Self::FeatureGate(_) => "feature gate probe",
            Self::FeatureGateRead(_) => "feature gate read",
            Self::HealthRegistration(_) => "health registration",
            Self::Runtime(_) => "manager",
        }
    }
}

impl From<FeatureGateError> for BootstrapError {
    fn from(error: FeatureGateError) -> Self {
        match error {
            FeatureGateError::TimedOut => Self::FeatureGateTimeout(error),
            other => Self::FeatureGate(other),
        }
    }
}
