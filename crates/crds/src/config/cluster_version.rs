//! ClusterVersion
//!
//! Reports the release the cluster is running or updating to. The bootstrap
//! only needs the desired version and the update history, which it uses to
//! pick the feature-gate set when its own release version is unknown.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the singleton ClusterVersion object.
pub const CLUSTER_VERSION_NAME: &str = "version";

/// ClusterVersionSpec is the desired release state of the cluster
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "ClusterVersion",
    status = "ClusterVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionSpec {
    /// Unique identifier of the cluster
    #[serde(default, rename = "clusterID")]
    pub cluster_id: String,

    /// Update channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Requested target release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_update: Option<Release>,
}

/// A release image and its semantic version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Semantic version of the release (e.g. `4.16.0`)
    #[serde(default)]
    pub version: String,

    /// Release payload image
    #[serde(default)]
    pub image: String,
}

/// Observed release state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionStatus {
    /// Release the cluster is reconciling towards
    #[serde(default)]
    pub desired: Release,

    /// Updates applied to the cluster, newest first
    #[serde(default)]
    pub history: Vec<UpdateHistory>,
}

/// One entry of the update history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHistory {
    /// `Completed` or `Partial`
    #[serde(default)]
    pub state: String,

    /// Version of the release
    #[serde(default)]
    pub version: String,

    /// Release payload image
    #[serde(default)]
    pub image: String,

    /// When the update started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_time: Option<chrono::DateTime<chrono::Utc>>,

    /// When the update completed, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl ClusterVersion {
    /// Release version the cluster is moving to.
    ///
    /// Uses `status.desired.version`, falling back to the newest history entry
    /// while the desired release has not been reported yet.
    pub fn desired_version(&self) -> Option<&str> {
        let status = self.status.as_ref()?;
        if !status.desired.version.is_empty() {
            return Some(status.desired.version.as_str());
        }
        status
            .history
            .first()
            .map(|entry| entry.version.as_str())
            .filter(|version| !version.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml(yaml: &str) -> ClusterVersion {
        serde_yaml::from_str(yaml).expect("valid ClusterVersion")
    }

    #[test]
    fn test_desired_version_from_status() {
        let cv = from_yaml(
            r"
apiVersion: config.openshift.io/v1
kind: ClusterVersion
metadata:
  name: version
spec:
  clusterID: 6a1c2c4e
status:
  desired:
    version: 4.16.3
    image: quay.io/openshift-release-dev/ocp-release@sha256:abc
  history:
  - state: Completed
    version: 4.16.2
",
        );
        assert_eq!(cv.desired_version(), Some("4.16.3"));
    }

    #[test]
    fn test_desired_version_falls_back_to_history() {
        let cv = from_yaml(
            r"
apiVersion: config.openshift.io/v1
kind: ClusterVersion
metadata:
  name: version
spec: {}
status:
  desired: {}
  history:
  - state: Partial
    version: 4.17.0
  - state: Completed
    version: 4.16.2
",
        );
        assert_eq!(cv.desired_version(), Some("4.17.0"));
    }

    #[test]
    fn test_desired_version_absent_without_status() {
        let cv = ClusterVersion::new(CLUSTER_VERSION_NAME, ClusterVersionSpec::default());
        assert_eq!(cv.desired_version(), None);
    }
}
