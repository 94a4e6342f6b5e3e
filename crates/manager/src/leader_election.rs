//! Leader election
//!
//! Lease-based leader election with client-go semantics. A candidate takes the
//! lease when it does not exist, when it already holds it, or when the current
//! holder has not renewed it for a full lease duration as observed locally.
//! The holder renews every retry period and gives up leadership when it cannot
//! renew within the renew deadline.

use crate::error::ManagerError;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client};
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The only supported resource lock.
pub const LEASES_RESOURCE_LOCK: &str = "leases";

/// Factor applied to the retry period when checking it against the renew deadline.
const JITTER_FACTOR: f64 = 1.2;

/// Leader election settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    /// Whether to campaign at all; when false the replica leads immediately
    pub leader_elect: bool,

    /// How long non-holders wait after the last observed renewal before taking over
    pub lease_duration: Duration,

    /// How long the holder keeps retrying a renewal before giving up
    pub renew_deadline: Duration,

    /// Interval between acquisition and renewal attempts
    pub retry_period: Duration,

    /// Lock type; only `leases` is supported
    pub resource_lock: String,

    /// Lease name
    pub resource_name: String,

    /// Lease namespace
    pub resource_namespace: String,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            leader_elect: false,
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
            resource_lock: LEASES_RESOURCE_LOCK.to_string(),
            resource_name: String::new(),
            resource_namespace: String::new(),
        }
    }
}

impl LeaderElectionConfig {
    /// Checks `retry_period * 1.2 < renew_deadline < lease_duration` and the
    /// lease identity. A disabled configuration is always valid.
    pub fn validate(&self) -> Result<(), ManagerError> {
        if !self.leader_elect {
            return Ok(());
        }
        let invalid = |reason: String| Err(ManagerError::InvalidLeaderElection(reason));

        if self.lease_duration <= self.renew_deadline {
            return invalid(format!(
                "leaseDuration ({:?}) must be greater than renewDeadline ({:?})",
                self.lease_duration, self.renew_deadline
            ));
        }
        if self.renew_deadline.as_secs_f64() <= JITTER_FACTOR * self.retry_period.as_secs_f64() {
            return invalid(format!(
                "renewDeadline ({:?}) must be greater than retryPeriod*JitterFactor ({:?}*{})",
                self.renew_deadline, self.retry_period, JITTER_FACTOR
            ));
        }
        if self.retry_period.is_zero() {
            return invalid("retryPeriod must be greater than zero".to_string());
        }
        if self.resource_lock != LEASES_RESOURCE_LOCK {
            return invalid(format!(
                "unsupported resource lock {:?}, only {:?} is supported",
                self.resource_lock, LEASES_RESOURCE_LOCK
            ));
        }
        if self.resource_name.is_empty() {
            return invalid("resource name must not be empty".to_string());
        }
        if self.resource_namespace.is_empty() {
            return invalid("resource namespace must not be empty".to_string());
        }
        Ok(())
    }
}

/// Holder information stored in the Lease spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionRecord {
    /// Identity of the current holder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_identity: Option<String>,

    /// Lease duration the holder announced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,

    /// When the current holder acquired the lease
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_micro_time"
    )]
    pub acquire_time: Option<DateTime<Utc>>,

    /// When the current holder last renewed the lease
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_micro_time"
    )]
    pub renew_time: Option<DateTime<Utc>>,

    /// Number of holder changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_transitions: Option<i32>,
}

fn serialize_micro_time<S: Serializer>(
    time: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Micros, true)),
        None => serializer.serialize_none(),
    }
}

impl LeaderElectionRecord {
    /// Reads the record out of a Lease.
    pub fn from_lease(lease: &Lease) -> Result<Self, ManagerError> {
        match &lease.spec {
            Some(spec) => Ok(serde_json::from_value(serde_json::to_value(spec)?)?),
            None => Ok(Self::default()),
        }
    }

    /// Converts the record into a Lease spec.
    pub fn to_lease_spec(&self) -> Result<LeaseSpec, ManagerError> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    /// Holder identity, empty when nobody holds the lease.
    pub fn holder(&self) -> &str {
        self.holder_identity.as_deref().unwrap_or("")
    }

    /// The record `identity` should write at `now`, or `None` when another
    /// holder's unexpired lease must be respected.
    pub fn next_for(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        lease_duration: Duration,
        expired: bool,
    ) -> Option<Self> {
        let holder = self.holder();
        let is_leader = holder == identity;
        if !holder.is_empty() && !is_leader && !expired {
            return None;
        }

        let (acquire_time, lease_transitions) = if is_leader {
            (self.acquire_time.or(Some(now)), self.lease_transitions.or(Some(0)))
        } else {
            (Some(now), Some(self.lease_transitions.unwrap_or(0) + 1))
        };

        Some(Self {
            holder_identity: Some(identity.to_string()),
            lease_duration_seconds: Some(i32::try_from(lease_duration.as_secs()).unwrap_or(i32::MAX)),
            acquire_time,
            renew_time: Some(now),
            lease_transitions,
        })
    }
}

/// Record last read from the API server and when this replica first saw it.
struct Observed {
    record: LeaderElectionRecord,
    at: Instant,
}

/// Campaigns for and renews a single Lease.
pub struct LeaderElector {
    api: Api<Lease>,
    name: String,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
    observed: Mutex<Option<Observed>>,
}

impl LeaderElector {
    /// Creates an elector for the lease described by `config`.
    pub fn new(client: Client, config: &LeaderElectionConfig, identity: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, &config.resource_namespace),
            name: config.resource_name.clone(),
            namespace: config.resource_namespace.clone(),
            identity: identity.into(),
            lease_duration: config.lease_duration,
            renew_deadline: config.renew_deadline,
            retry_period: config.retry_period,
            observed: Mutex::new(None),
        }
    }

    /// This replica's identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// `namespace/name` of the lease.
    pub fn lease_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Records `record` as observed; the observation time only moves when the
    /// record changes.
    fn observe(&self, record: LeaderElectionRecord) -> bool {
        let now = Instant::now();
        let Ok(mut observed) = self.observed.lock() else {
            return false;
        };
        let changed = observed.as_ref().is_none_or(|o| o.record != record);
        if changed {
            *observed = Some(Observed { record, at: now });
        }
        let at = observed.as_ref().map_or(now, |o| o.at);
        at + self.lease_duration <= now
    }

    /// One acquisition or renewal attempt. Returns whether this replica holds
    /// the lease afterwards.
    pub async fn try_acquire_or_renew(&self) -> Result<bool, ManagerError> {
        let now = Utc::now();

        let Some(lease) = self.api.get_opt(&self.name).await? else {
            let record = LeaderElectionRecord {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(
                    i32::try_from(self.lease_duration.as_secs()).unwrap_or(i32::MAX),
                ),
                acquire_time: Some(now),
                renew_time: Some(now),
                lease_transitions: Some(0),
            };
            let lease = Lease {
                metadata: ObjectMeta {
                    name: Some(self.name.clone()),
                    namespace: Some(self.namespace.clone()),
                    ..Default::default()
                },
                spec: Some(record.to_lease_spec()?),
            };
            self.api.create(&PostParams::default(), &lease).await?;
            self.observe(record);
            return Ok(true);
        };

        let current = LeaderElectionRecord::from_lease(&lease)?;
        let expired = self.observe(current.clone());
        let Some(next) = current.next_for(&self.identity, now, self.lease_duration, expired) else {
            debug!(
                "Lease {} is held by {} and has not expired yet",
                self.lease_key(),
                current.holder()
            );
            return Ok(false);
        };

        let mut updated = lease;
        updated.spec = Some(next.to_lease_spec()?);
        // resourceVersion is kept, so a concurrent writer makes this fail.
        self.api
            .replace(&self.name, &PostParams::default(), &updated)
            .await?;
        self.observe(next);
        Ok(true)
    }

    /// Retries acquisition every retry period until the lease is held or
    /// `cancel` fires. Returns whether the lease was acquired.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        info!("Attempting to acquire leader lease {}...", self.lease_key());
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(
                        "Successfully acquired lease {} as {}",
                        self.lease_key(),
                        self.identity
                    );
                    return true;
                }
                Ok(false) => {}
                Err(e) => error!("Error retrieving resource lock {}: {}", self.lease_key(), e),
            }

            tokio::select! {
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(self.retry_period) => {}
            }
        }
    }

    /// Keeps renewing the lease every retry period until `cancel` fires.
    ///
    /// Fails with [`ManagerError::LeaderElectionLost`] when no renewal
    /// succeeds within the renew deadline.
    pub async fn hold(&self, cancel: &CancellationToken) -> Result<(), ManagerError> {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.retry_period) => {}
            }

            let renewed = tokio::time::timeout(self.renew_deadline, self.renew(cancel)).await;
            match renewed {
                Ok(true) => debug!("Renewed lease {}", self.lease_key()),
                Ok(false) => return Ok(()),
                Err(_) => {
                    return Err(ManagerError::LeaderElectionLost(format!(
                        "failed to renew lease {} within {:?}",
                        self.lease_key(),
                        self.renew_deadline
                    )));
                }
            }
        }
    }

    /// Retries renewal until it succeeds (`true`) or `cancel` fires (`false`).
    async fn renew(&self, cancel: &CancellationToken) -> bool {
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => return true,
                Ok(false) => warn!("Lease {} was taken over by another holder", self.lease_key()),
                Err(e) => warn!("Failed to renew lease {}: {}", self.lease_key(), e),
            }
            tokio::select! {
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(self.retry_period) => {}
            }
        }
    }
}

/// `<hostname>_<uuid>`, unique per process.
pub fn default_identity() -> String {
    format!("{}_{}", hostname(|name| std::env::var(name).ok()), uuid::Uuid::new_v4())
}

/// Pod or host name: `POD_NAME`, then `HOSTNAME`, then the kernel hostname.
fn hostname(env: impl Fn(&str) -> Option<String>) -> String {
    ["POD_NAME", "HOSTNAME"]
        .into_iter()
        .filter_map(|name| env(name))
        .chain(std::fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
