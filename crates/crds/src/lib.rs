//! OpenShift API types
//!
//! Typed views of the cluster objects the machine-api-migration bootstrap reads:
//! - `config.openshift.io/v1`: `ClusterVersion` and `FeatureGate` (cluster scoped)
//! - `machine.openshift.io/v1beta1`: `Machine` and `MachineSet` (namespaced)
//!
//! Only the fields the bootstrap and its collaborators consume are modelled;
//! unknown fields are ignored on deserialization.

pub mod config;
pub mod features;
pub mod machine_api;
pub mod references;

pub use config::*;
pub use features::*;
pub use machine_api::*;
pub use references::*;
