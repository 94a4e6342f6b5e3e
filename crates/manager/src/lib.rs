//! Controller Runtime Manager
//!
//! Hosts the long-running parts of a Kubernetes controller process:
//! - a namespaced object cache fed by reflectors, with periodic resync
//! - Lease-based leader election (`coordination.k8s.io/v1`)
//! - liveness (`/healthz`) and readiness (`/readyz`) endpoints
//! - a Prometheus metrics endpoint
//! - the lifecycle of registered runnables, which only start once this
//!   replica holds the lease
//!
//! A process builds a [`Manager`], registers checks and runnables, installs a
//! [`ShutdownSignal`] and hands control to [`Manager::start`].

pub mod cache;
pub mod error;
pub mod healthz;
pub mod leader_election;
pub mod manager;
pub mod metrics;
pub mod options;
pub mod runnable;
pub mod scheme;
pub mod signals;

pub use cache::{Cache, CacheOptions, NamespaceConfig};
pub use error::ManagerError;
pub use leader_election::{LeaderElectionConfig, LeaderElector};
pub use manager::Manager;
pub use metrics::Metrics;
pub use options::{parse_bind_address, ManagerOptions};
pub use runnable::Runnable;
pub use scheme::Scheme;
pub use signals::{setup_signal_handler, ShutdownSignal};
