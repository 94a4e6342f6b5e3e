//! MachineSet
//!
//! Keeps a number of identical Machines running.

use crate::machine_api::machine::{MachineAuthority, MachineSpec, ObjectMetaTemplate};
use kube::CustomResource;
use std::collections::BTreeMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MachineSetSpec defines the desired state of a MachineSet
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "MachineSet",
    namespaced,
    status = "MachineSetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    /// Desired number of Machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Label query over Machines owned by this set
    #[serde(default)]
    pub selector: MachineSelector,

    /// Template for new Machines
    #[serde(default)]
    pub template: MachineTemplateSpec,

    /// Whether the Machine API or Cluster API is authoritative for this resource
    #[serde(default, rename = "authoritativeAPI", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub authoritative_api: Option<MachineAuthority>,
}

/// Label query over Machines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSelector {
    /// Labels a Machine must carry to match
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

/// Template used to stamp out Machines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MachineTemplateSpec {
    /// Metadata for created Machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMetaTemplate>,

    /// Spec for created Machines
    #[serde(default)]
    pub spec: MachineSpec,
}

/// Observed state of a MachineSet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetStatus {
    /// Number of Machines currently owned
    #[serde(default)]
    pub replicas: i32,

    /// Number of owned Machines with a ready Node
    #[serde(default)]
    pub ready_replicas: i32,

    /// Number of owned Machines available for at least minReadySeconds
    #[serde(default)]
    pub available_replicas: i32,
}
