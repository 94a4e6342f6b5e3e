//! Feature-gate snapshots
//!
//! A [`FeatureGateSnapshot`] is the resolved gate set for one release version,
//! taken from a single observation of the cluster `FeatureGate` object.

use crds::FeatureGateDetails;
use std::collections::BTreeSet;
use std::fmt;

/// Enabled and disabled gates for a specific release version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureGateSnapshot {
    version: String,
    enabled: BTreeSet<String>,
    disabled: BTreeSet<String>,
}

impl FeatureGateSnapshot {
    /// Builds a snapshot from explicit gate lists.
    pub fn new<I, S>(version: impl Into<String>, enabled: I, disabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: version.into(),
            enabled: enabled.into_iter().map(Into::into).collect(),
            disabled: disabled.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a snapshot from one `status.featureGates` entry.
    pub fn from_details(details: &FeatureGateDetails) -> Self {
        Self {
            version: details.version.clone(),
            enabled: details.enabled.iter().map(|gate| gate.name.clone()).collect(),
            disabled: details.disabled.iter().map(|gate| gate.name.clone()).collect(),
        }
    }

    /// Release version the snapshot was resolved for.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether `feature` is enabled. Gates the cluster does not know about are
    /// reported as disabled.
    pub fn enabled(&self, feature: &str) -> bool {
        self.enabled.contains(feature)
    }

    /// Whether the cluster reported `feature` at all.
    pub fn is_known(&self, feature: &str) -> bool {
        self.enabled.contains(feature) || self.disabled.contains(feature)
    }

    /// All gate names the cluster reported, sorted.
    pub fn known_features(&self) -> Vec<&str> {
        self.enabled
            .union(&self.disabled)
            .map(String::as_str)
            .collect()
    }

    /// Whether both snapshots enable and disable the same gates, whatever
    /// version they were resolved for.
    pub fn same_gates(&self, other: &Self) -> bool {
        self.enabled == other.enabled && self.disabled == other.disabled
    }

    /// Gates enabled in `self` but not in `previous`.
    fn turned_on_since(&self, previous: &Self) -> Vec<String> {
        self.enabled.difference(&previous.enabled).cloned().collect()
    }
}

impl fmt::Display for FeatureGateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version={} enabled={:?} disabled={:?}",
            self.version, self.enabled, self.disabled
        )
    }
}

/// A change of the resolved gate set after the first observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureChange {
    /// Snapshot in effect before the change
    pub previous: FeatureGateSnapshot,

    /// Snapshot observed now
    pub new: FeatureGateSnapshot,
}

impl FeatureChange {
    /// Gates that were switched on.
    pub fn turned_on(&self) -> Vec<String> {
        self.new.turned_on_since(&self.previous)
    }

    /// Gates that were switched off.
    pub fn turned_off(&self) -> Vec<String> {
        self.previous.turned_on_since(&self.new)
    }
}
