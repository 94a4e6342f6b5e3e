//! Machine
//!
//! A single host provisioned through the Machine API.

use crate::references::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MachineSpec defines the desired state of a Machine
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Labels and annotations propagated to the backing Node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMetaTemplate>,

    /// Provider-specific machine configuration
    #[serde(default)]
    pub provider_spec: ProviderSpec,

    /// Cloud provider identifier of the instance
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Whether the Machine API or Cluster API is authoritative for this resource
    #[serde(default, rename = "authoritativeAPI", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub authoritative_api: Option<MachineAuthority>,
}

/// Labels and annotations applied to generated objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ObjectMetaTemplate {
    /// Labels
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub labels: std::collections::BTreeMap<String, String>,

    /// Annotations
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub annotations: std::collections::BTreeMap<String, String>,
}

/// Opaque provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProviderSpec {
    /// Raw provider payload, interpreted by the platform actuator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// API that owns reconciliation of a migrated resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum MachineAuthority {
    /// The Machine API is authoritative
    #[default]
    MachineAPI,

    /// The Cluster API is authoritative
    ClusterAPI,

    /// Authority is being handed over
    Migrating,

    /// A value added by a newer API version
    Other(String),
}

impl From<String> for MachineAuthority {
    fn from(value: String) -> Self {
        match value.as_str() {
            "MachineAPI" => Self::MachineAPI,
            "ClusterAPI" => Self::ClusterAPI,
            "Migrating" => Self::Migrating,
            _ => Self::Other(value),
        }
    }
}

impl From<MachineAuthority> for String {
    fn from(authority: MachineAuthority) -> Self {
        match authority {
            MachineAuthority::MachineAPI => "MachineAPI".to_string(),
            MachineAuthority::ClusterAPI => "ClusterAPI".to_string(),
            MachineAuthority::Migrating => "Migrating".to_string(),
            MachineAuthority::Other(value) => value,
        }
    }
}

/// Observed state of a Machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Node backed by this Machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<ObjectReference>,

    /// Lifecycle phase (`Provisioning`, `Provisioned`, `Running`, `Deleting`, `Failed`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Terminal error reported by the actuator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Authority currently in effect
    #[serde(default, rename = "authoritativeAPI", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub authoritative_api: Option<MachineAuthority>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_machine() {
        let machine: Machine = serde_yaml::from_str(
            r#"
apiVersion: machine.openshift.io/v1beta1
kind: Machine
metadata:
  name: worker-a-7xk2p
  namespace: openshift-machine-api
spec:
  providerID: aws:///us-east-1a/i-0abc
  providerSpec:
    value:
      instanceType: m6i.xlarge
  authoritativeAPI: MachineAPI
status:
  phase: Running
  nodeRef:
    kind: Node
    name: ip-10-0-1-12
"#,
        )
        .expect("valid Machine");

        assert_eq!(machine.spec.provider_id.as_deref(), Some("aws:///us-east-1a/i-0abc"));
        assert_eq!(machine.spec.authoritative_api, Some(MachineAuthority::MachineAPI));
        let status = machine.status.expect("status present");
        assert_eq!(status.phase.as_deref(), Some("Running"));
        assert_eq!(status.node_ref, Some(ObjectReference::node("ip-10-0-1-12")));
    }

    #[test]
    fn test_unlisted_authority_is_kept() {
        let machine: Machine = serde_yaml::from_str(
            r"
apiVersion: machine.openshift.io/v1beta1
kind: Machine
metadata:
  name: worker-b
  namespace: openshift-machine-api
spec:
  authoritativeAPI: Hybrid
status:
  authoritativeAPI: ClusterAPI
",
        )
        .expect("Machine with an unlisted authority");

        assert_eq!(
            machine.spec.authoritative_api,
            Some(MachineAuthority::Other("Hybrid".to_string()))
        );
        let status = machine.status.expect("status present");
        assert_eq!(status.authoritative_api, Some(MachineAuthority::ClusterAPI));
    }
}
