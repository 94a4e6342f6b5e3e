//! Manager error types.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while building or running the [`Manager`](crate::Manager).
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Leader election configuration is unusable
    #[error("Invalid leader election configuration: {0}")]
    InvalidLeaderElection(String),

    /// Cache configuration is unusable
    #[error("Invalid cache configuration: {0}")]
    InvalidCache(String),

    /// A bind address could not be parsed
    #[error("Invalid bind address {addr:?}: {reason}")]
    InvalidBindAddress {
        /// Address as given
        addr: String,
        /// Why it was rejected
        reason: String,
    },

    /// A health or readiness check could not be registered
    #[error("Unable to add {probe} checker {name:?}: {reason}")]
    CheckRegistration {
        /// `healthz` or `readyz`
        probe: &'static str,
        /// Checker name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A listener could not be bound
    #[error("Unable to bind {addr}: {source}")]
    Bind {
        /// Address that failed
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// An HTTP server stopped with an error
    #[error("{server} server failed: {source}")]
    Server {
        /// `health probe` or `metrics`
        server: &'static str,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// The Lease record could not be converted
    #[error("Invalid leader election record: {0}")]
    LeaseRecord(#[from] serde_json::Error),

    /// The lease could not be renewed within the renew deadline
    #[error("leader election lost: {0}")]
    LeaderElectionLost(String),

    /// The cache stopped before it synced
    #[error("Cache failed to sync: {0}")]
    CacheSync(String),

    /// A cached object could not be converted to the requested type
    #[error("Cache read failed: {0}")]
    CacheRead(String),

    /// A runnable returned an error or panicked
    #[error("Runnable {name} failed: {reason}")]
    Runnable {
        /// Runnable name
        name: String,
        /// Error message
        reason: String,
    },
}
