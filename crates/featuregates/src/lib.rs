//! Feature-Gate Access
//!
//! Observes the cluster `FeatureGate` and `ClusterVersion` objects and resolves
//! the set of enabled and disabled feature gates for the running release.
//!
//! The accessor publishes its first snapshot exactly once. Any later change of
//! the resolved gates is handed to a change handler; the default handler exits
//! the process successfully so that its supervisor restarts it with the new
//! gates.
//!
//! [`probe`] wires the accessor to a cluster connection and waits (bounded) for
//! the first snapshot.

pub mod access;
pub mod error;
pub mod informers;
pub mod probe;
pub mod snapshot;

pub use access::*;
pub use error::*;
pub use informers::*;
pub use probe::*;
pub use snapshot::*;
