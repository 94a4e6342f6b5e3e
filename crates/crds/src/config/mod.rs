//! `config.openshift.io/v1` types
//!
//! Cluster-scoped configuration objects:
//! - ClusterVersion (singleton named `version`)
//! - FeatureGate (singleton named `cluster`)

pub mod cluster_version;
pub mod feature_gate;

pub use cluster_version::*;
pub use feature_gate::*;
