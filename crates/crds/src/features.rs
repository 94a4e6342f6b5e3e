//! Feature gate names
//!
//! Names of the cluster feature gates this process consults.

/// Enables migration of Machine API resources to Cluster API.
pub const FEATURE_GATE_MACHINE_API_MIGRATION: &str = "MachineAPIMigration";
