//! Config informers
//!
//! Shared reflectors over the cluster-scoped `config.openshift.io/v1` objects
//! the accessor reads. Every watch event and every resync tick wakes the
//! accessor; wake-ups are coalesced.

use crds::{ClusterVersion, FeatureGate, CLUSTER_VERSION_NAME, FEATURE_GATE_NAME};
use futures::StreamExt;
use kube::{Api, Client};
use kube_runtime::reflector::{self, Store};
use kube_runtime::{watcher, WatchStreamExt};
use std::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Read side of the config informers, handed to the accessor.
#[derive(Clone)]
pub struct ConfigInformerHandles {
    /// Cached `ClusterVersion` objects
    pub cluster_versions: Store<ClusterVersion>,

    /// Cached `FeatureGate` objects
    pub feature_gates: Store<FeatureGate>,

    /// Signalled on every watch event and resync tick
    pub changed: Arc<Notify>,
}

/// Informer factory for the config API group.
pub struct ConfigInformers {
    client: Client,
    resync_period: Duration,
    cluster_versions: (Store<ClusterVersion>, reflector::store::Writer<ClusterVersion>),
    feature_gates: (Store<FeatureGate>, reflector::store::Writer<FeatureGate>),
    changed: Arc<Notify>,
}

impl ConfigInformers {
    /// Creates the factory; nothing is watched until [`ConfigInformers::start`].
    pub fn new(client: Client, resync_period: Duration) -> Self {
        Self {
            client,
            resync_period,
            cluster_versions: reflector::store(),
            feature_gates: reflector::store(),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Read handles onto the caches.
    pub fn handles(&self) -> ConfigInformerHandles {
        ConfigInformerHandles {
            cluster_versions: self.cluster_versions.0.clone(),
            feature_gates: self.feature_gates.0.clone(),
            changed: Arc::clone(&self.changed),
        }
    }

    /// Runs both reflectors and the resync ticker until `cancel` fires.
    pub async fn start(self, cancel: CancellationToken) {
        info!(
            "Starting config informers (resync every {}s)",
            self.resync_period.as_secs()
        );

        let cluster_version_api: Api<ClusterVersion> = Api::all(self.client.clone());
        let feature_gate_api: Api<FeatureGate> = Api::all(self.client);

        let cluster_versions = watch_singleton(
            cluster_version_api,
            CLUSTER_VERSION_NAME,
            self.cluster_versions.1,
            Arc::clone(&self.changed),
        );
        let feature_gates = watch_singleton(
            feature_gate_api,
            FEATURE_GATE_NAME,
            self.feature_gates.1,
            Arc::clone(&self.changed),
        );

        let changed = Arc::clone(&self.changed);
        let resync_period = self.resync_period;
        let resync = async move {
            let mut ticker = interval_at(Instant::now() + resync_period, resync_period);
            loop {
                ticker.tick().await;
                debug!("Config informers resync");
                changed.notify_one();
            }
        };

        tokio::select! {
            () = cancel.cancelled() => info!("Stopping config informers"),
            () = cluster_versions => warn!("ClusterVersion informer exited"),
            () = feature_gates => warn!("FeatureGate informer exited"),
            () = resync => {}
        }
    }
}

/// Reflects the single object called `name` into `writer`, waking `changed`
/// after every event.
async fn watch_singleton<K>(
    api: Api<K>,
    name: &str,
    writer: reflector::store::Writer<K>,
    changed: Arc<Notify>,
) where
    K: kube::Resource<DynamicType = ()>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    let kind = K::kind(&()).to_string();
    let config = watcher::Config::default().fields(&format!("metadata.name={name}"));

    reflector::reflector(writer, watcher(api, config).default_backoff())
        .for_each(|event| {
            match event {
                Ok(_) => changed.notify_one(),
                Err(e) => warn!("{} watch error: {}", kind, e),
            }
            future::ready(())
        })
        .await;
}
