//! `machine.openshift.io/v1beta1` types
//!
//! The Machine API resources that the migration controllers operate on:
//! - Machine
//! - MachineSet

pub mod machine;
pub mod machine_set;

pub use machine::*;
pub use machine_set::*;
