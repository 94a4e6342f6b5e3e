//! FeatureGate
//!
//! The cluster-wide feature-gate configuration. The spec selects a feature
//! set; the status carries the resolved enabled/disabled gate lists, one entry
//! per release version present in the cluster.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the singleton FeatureGate object.
pub const FEATURE_GATE_NAME: &str = "cluster";

/// FeatureGateSpec selects the feature set for the cluster
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "FeatureGate",
    status = "FeatureGateStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGateSpec {
    /// Named feature set (empty means `Default`)
    #[serde(default)]
    #[schemars(with = "String")]
    pub feature_set: FeatureSet,

    /// Explicit gates, only honoured with the `CustomNoUpgrade` feature set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_no_upgrade: Option<CustomFeatureGates>,
}

/// Feature sets. Names this crate does not know are kept verbatim in
/// [`FeatureSet::Other`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum FeatureSet {
    /// Gates enabled on every cluster
    #[default]
    Default,

    /// Tech preview gates; blocks upgrades
    TechPreviewNoUpgrade,

    /// Developer preview gates; blocks upgrades
    DevPreviewNoUpgrade,

    /// Hand-picked gates; blocks upgrades
    CustomNoUpgrade,

    /// Any other named set, e.g. `OKD`
    Other(String),
}

impl From<String> for FeatureSet {
    fn from(name: String) -> Self {
        match name.as_str() {
            "" | "Default" => Self::Default,
            "TechPreviewNoUpgrade" => Self::TechPreviewNoUpgrade,
            "DevPreviewNoUpgrade" => Self::DevPreviewNoUpgrade,
            "CustomNoUpgrade" => Self::CustomNoUpgrade,
            _ => Self::Other(name),
        }
    }
}

impl From<FeatureSet> for String {
    fn from(set: FeatureSet) -> Self {
        match set {
            FeatureSet::Default => String::new(),
            FeatureSet::TechPreviewNoUpgrade => "TechPreviewNoUpgrade".to_string(),
            FeatureSet::DevPreviewNoUpgrade => "DevPreviewNoUpgrade".to_string(),
            FeatureSet::CustomNoUpgrade => "CustomNoUpgrade".to_string(),
            FeatureSet::Other(name) => name,
        }
    }
}

/// Gates requested for the `CustomNoUpgrade` feature set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CustomFeatureGates {
    /// Gates to turn on
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Gates to turn off
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Resolved gate lists, one entry per release version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGateStatus {
    /// Per-version gate resolution
    #[serde(default)]
    pub feature_gates: Vec<FeatureGateDetails>,
}

/// Enabled and disabled gates for one release version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FeatureGateDetails {
    /// Release version these gates apply to
    pub version: String,

    /// Gates that are on
    #[serde(default)]
    pub enabled: Vec<FeatureGateAttributes>,

    /// Gates that are off
    #[serde(default)]
    pub disabled: Vec<FeatureGateAttributes>,
}

/// A single gate name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FeatureGateAttributes {
    /// Gate name
    pub name: String,
}

impl FeatureGateAttributes {
    /// Wraps a gate name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl FeatureGate {
    /// Gate resolution recorded for `version`, if any.
    pub fn details_for_version(&self, version: &str) -> Option<&FeatureGateDetails> {
        self.status
            .as_ref()?
            .feature_gates
            .iter()
            .find(|details| details.version == version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURE_GATE_YAML: &str = r#"
apiVersion: config.openshift.io/v1
kind: FeatureGate
metadata:
  name: cluster
spec:
  featureSet: ""
status:
  featureGates:
  - version: 4.16.0
    enabled:
    - name: MachineAPIMigration
    disabled:
    - name: ClusterAPIInstall
  - version: 4.15.9
    enabled: []
    disabled:
    - name: MachineAPIMigration
"#;

    #[test]
    fn test_deserialize_feature_gate() {
        let fg: FeatureGate = serde_yaml::from_str(FEATURE_GATE_YAML).expect("valid FeatureGate");
        assert_eq!(fg.spec.feature_set, FeatureSet::Default);

        let status = fg.status.as_ref().expect("status present");
        assert_eq!(status.feature_gates.len(), 2);
        assert_eq!(
            status.feature_gates[0].enabled,
            vec![FeatureGateAttributes::new("MachineAPIMigration")]
        );
    }

    #[test]
    fn test_details_for_version() {
        let fg: FeatureGate = serde_yaml::from_str(FEATURE_GATE_YAML).expect("valid FeatureGate");

        let details = fg.details_for_version("4.15.9").expect("4.15.9 present");
        assert!(details.enabled.is_empty());
        assert_eq!(details.disabled[0].name, "MachineAPIMigration");

        assert!(fg.details_for_version("4.18.0").is_none());
    }

    #[test]
    fn test_tech_preview_feature_set() {
        let fg: FeatureGate = serde_yaml::from_str(
            r"
apiVersion: config.openshift.io/v1
kind: FeatureGate
metadata:
  name: cluster
spec:
  featureSet: TechPreviewNoUpgrade
",
        )
        .expect("valid FeatureGate");
        assert_eq!(fg.spec.feature_set, FeatureSet::TechPreviewNoUpgrade);
        assert!(fg.details_for_version("4.16.0").is_none());
    }

    #[test]
    fn test_unlisted_feature_set_is_kept() {
        let fg: FeatureGate = serde_yaml::from_str(
            r"
apiVersion: config.openshift.io/v1
kind: FeatureGate
metadata:
  name: cluster
spec:
  featureSet: OKD
status:
  featureGates:
  - version: 4.16.0
    enabled:
    - name: MachineAPIMigration
    disabled: []
",
        )
        .expect("FeatureGate with an unlisted feature set");
        assert_eq!(fg.spec.feature_set, FeatureSet::Other("OKD".to_string()));
        assert!(fg.details_for_version("4.16.0").is_some());

        let json = serde_json::to_value(&fg.spec).expect("serialize");
        assert_eq!(json["featureSet"], "OKD");
    }
}
