//! Object cache
//!
//! Reflector-backed cache of every kind in the [`Scheme`], restricted to the
//! configured namespaces. Reads go through [`Cache`], which is cheap to clone;
//! the write side runs inside [`Manager::start`](crate::Manager::start).
//!
//! Every sync period the cache broadcasts a resync tick so that consumers can
//! re-evaluate everything they have seen.

use crate::error::ManagerError;
use crate::metrics::Metrics;
use crate::scheme::Scheme;
use futures::{FutureExt, StreamExt};
use kube::api::DynamicObject;
use kube::core::ApiResource;
use kube::{Api, Client, Resource};
use kube_runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default resync period when none is configured.
pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(10 * 60 * 60);

/// Per-namespace watch restrictions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Label selector applied to every watch in the namespace
    pub label_selector: Option<String>,

    /// Field selector applied to every watch in the namespace
    pub field_selector: Option<String>,
}

/// Which namespaces the cache observes and how often it resyncs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Namespaces to cache, with their watch restrictions
    pub default_namespaces: BTreeMap<String, NamespaceConfig>,

    /// Interval between resync ticks
    pub sync_period: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            default_namespaces: BTreeMap::new(),
            sync_period: DEFAULT_SYNC_PERIOD,
        }
    }
}

impl CacheOptions {
    /// Caches only `namespace`, resyncing every `sync_period`.
    pub fn single_namespace(namespace: impl Into<String>, sync_period: Duration) -> Self {
        Self {
            default_namespaces: BTreeMap::from([(namespace.into(), NamespaceConfig::default())]),
            sync_period,
        }
    }

    /// At least one non-empty namespace and a non-zero sync period.
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.default_namespaces.is_empty() {
            return Err(ManagerError::InvalidCache(
                "at least one namespace must be configured".to_string(),
            ));
        }
        if self.default_namespaces.keys().any(String::is_empty) {
            return Err(ManagerError::InvalidCache(
                "namespace names must not be empty".to_string(),
            ));
        }
        if self.sync_period.is_zero() {
            return Err(ManagerError::InvalidCache(
                "sync period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn kind_key(resource: &ApiResource) -> String {
    format!("{}/{}", resource.api_version, resource.kind)
}

struct CachedKind {
    resource: ApiResource,
    stores: BTreeMap<String, Store<DynamicObject>>,
}

/// Read side of the object cache.
#[derive(Clone)]
pub struct Cache {
    kinds: Arc<BTreeMap<String, CachedKind>>,
    namespaces: Arc<Vec<String>>,
    resync: broadcast::Sender<()>,
}

/// Write side of the object cache: one reflector per kind and namespace.
pub(crate) struct CacheInformers {
    client: Client,
    informers: Vec<Informer>,
    namespaces: Vec<String>,
    sync_period: Duration,
    resync: broadcast::Sender<()>,
    metrics: Metrics,
}

struct Informer {
    resource: ApiResource,
    namespace: String,
    config: NamespaceConfig,
    writer: Writer<DynamicObject>,
}

impl Cache {
    /// Builds both halves of the cache. Nothing is watched until the
    /// informers run.
    pub(crate) fn build(
        client: Client,
        scheme: &Scheme,
        options: &CacheOptions,
        metrics: Metrics,
    ) -> Result<(Self, CacheInformers), ManagerError> {
        options.validate()?;

        let namespaces: Vec<String> = options.default_namespaces.keys().cloned().collect();
        let mut kinds = BTreeMap::new();
        let mut informers = Vec::new();

        for resource in scheme.kinds() {
            let mut stores = BTreeMap::new();
            for (namespace, config) in &options.default_namespaces {
                let writer = Writer::new(resource.clone());
                stores.insert(namespace.clone(), writer.as_reader());
                informers.push(Informer {
                    resource: resource.clone(),
                    namespace: namespace.clone(),
                    config: config.clone(),
                    writer,
                });
            }
            kinds.insert(
                kind_key(resource),
                CachedKind {
                    resource: resource.clone(),
                    stores,
                },
            );
        }

        let (resync, _) = broadcast::channel(16);
        let cache = Self {
            kinds: Arc::new(kinds),
            namespaces: Arc::new(namespaces.clone()),
            resync: resync.clone(),
        };
        let informers = CacheInformers {
            client,
            informers,
            namespaces,
            sync_period: options.sync_period,
            resync,
            metrics,
        };
        Ok((cache, informers))
    }

    /// Namespaces this cache observes.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Store of `K` objects in `namespace`.
    fn store_for<K>(&self, namespace: &str) -> Result<(&ApiResource, &Store<DynamicObject>), ManagerError>
    where
        K: Resource<DynamicType = ()>,
    {
        let key = kind_key(&ApiResource::erase::<K>(&()));
        let kind = self
            .kinds
            .get(&key)
            .ok_or_else(|| ManagerError::CacheRead(format!("kind {key} is not registered in the scheme")))?;
        let store = kind
            .stores
            .get(namespace)
            .ok_or_else(|| ManagerError::CacheRead(format!("namespace {namespace} is not cached")))?;
        Ok((&kind.resource, store))
    }

    /// All cached `K` objects in `namespace`.
    pub fn list<K>(&self, namespace: &str) -> Result<Vec<K>, ManagerError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let (_, store) = self.store_for::<K>(namespace)?;
        store
            .state()
            .into_iter()
            .map(|object| {
                object
                    .as_ref()
                    .clone()
                    .try_parse::<K>()
                    .map_err(|e| ManagerError::CacheRead(e.to_string()))
            })
            .collect()
    }

    /// The cached `K` called `name` in `namespace`.
    pub fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, ManagerError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let (resource, store) = self.store_for::<K>(namespace)?;
        let reference = ObjectRef::new_with(name, resource.clone()).within(namespace);
        store
            .get(&reference)
            .map(|object| {
                object
                    .as_ref()
                    .clone()
                    .try_parse::<K>()
                    .map_err(|e| ManagerError::CacheRead(e.to_string()))
            })
            .transpose()
    }

    fn stores(&self) -> impl Iterator<Item = &Store<DynamicObject>> {
        self.kinds.values().flat_map(|kind| kind.stores.values())
    }

    /// Whether every store has completed its initial list.
    pub fn is_synced(&self) -> bool {
        self.stores()
            .all(|store| matches!(store.wait_until_ready().now_or_never(), Some(Ok(()))))
    }

    /// Waits until every store has completed its initial list.
    pub async fn wait_for_cache_sync(&self) -> Result<(), ManagerError> {
        for store in self.stores() {
            store
                .wait_until_ready()
                .await
                .map_err(|e| ManagerError::CacheSync(e.to_string()))?;
        }
        Ok(())
    }

    /// Receives a tick every sync period.
    pub fn subscribe_resync(&self) -> broadcast::Receiver<()> {
        self.resync.subscribe()
    }
}

impl CacheInformers {
    /// Runs every reflector and the resync ticker until `stop` fires.
    pub(crate) async fn run(self, stop: CancellationToken) {
        info!(
            "Starting {} cache informers for namespaces {:?}",
            self.informers.len(),
            self.namespaces
        );

        let client = self.client;
        let reflectors = self.informers.into_iter().map(|informer| {
            let api: Api<DynamicObject> =
                Api::namespaced_with(client.clone(), &informer.namespace, &informer.resource);
            let mut config = watcher::Config::default();
            if let Some(labels) = &informer.config.label_selector {
                config = config.labels(labels);
            }
            if let Some(fields) = &informer.config.field_selector {
                config = config.fields(fields);
            }
            let description = format!("{}/{}", informer.namespace, kind_key(&informer.resource));

            async move {
                reflector::reflector(informer.writer, watcher(api, config).default_backoff())
                    .for_each(|event| {
                        if let Err(e) = event {
                            warn!("Cache informer {} watch error: {}", description, e);
                        }
                        future::ready(())
                    })
                    .await;
                warn!("Cache informer {} stopped", description);
            }
        });
        let reflectors = futures::future::join_all(reflectors);

        let resync = {
            let sync_period = self.sync_period;
            let namespaces = self.namespaces;
            let sender = self.resync;
            let metrics = self.metrics;
            async move {
                let mut ticker = interval_at(Instant::now() + sync_period, sync_period);
                loop {
                    ticker.tick().await;
                    debug!("Cache resync");
                    for namespace in &namespaces {
                        metrics.record_resync(namespace);
                    }
                    if sender.send(()).is_err() {
                        debug!("No resync subscribers");
                    }
                }
            }
        };

        tokio::select! {
            () = stop.cancelled() => info!("Stopping cache informers"),
            _ = reflectors => {}
            () = resync => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn test_single_namespace_options() {
        let options = CacheOptions::single_namespace("openshift-cluster-api", Duration::from_secs(600));
        assert!(options.validate().is_ok());
        assert_eq!(
            options.default_namespaces.keys().collect::<Vec<_>>(),
            vec!["openshift-cluster-api"]
        );
        assert_eq!(options.sync_period, Duration::from_secs(600));
    }

    #[test]
    fn test_validate_rejects_empty_options() {
        assert!(matches!(
            CacheOptions::default().validate(),
            Err(ManagerError::InvalidCache(_))
        ));
        assert!(CacheOptions::single_namespace("", Duration::from_secs(1)).validate().is_err());
        assert!(CacheOptions::single_namespace("ns", Duration::ZERO).validate().is_err());
    }

    #[tokio::test]
    async fn test_cache_scoped_to_configured_namespace() {
        let client = Client::try_from(kube::Config::new(
            "http://127.0.0.1:9".parse().expect("valid uri"),
        ))
        .expect("client");
        let mut scheme = Scheme::new();
        scheme.add::<ConfigMap>();

        let (cache, informers) = Cache::build(
            client,
            &scheme,
            &CacheOptions::single_namespace("openshift-cluster-api", Duration::from_secs(600)),
            Metrics::new().expect("metrics"),
        )
        .expect("cache");

        assert_eq!(cache.namespaces(), ["openshift-cluster-api".to_string()]);
        assert_eq!(informers.informers.len(), 1);
        assert_eq!(informers.informers[0].namespace, "openshift-cluster-api");

        // Nothing has been listed yet.
        assert!(!cache.is_synced());
        assert!(cache.list::<ConfigMap>("openshift-cluster-api").expect("cached").is_empty());

        assert!(matches!(
            cache.list::<ConfigMap>("default"),
            Err(ManagerError::CacheRead(_))
        ));
        assert!(matches!(
            cache.get::<k8s_openapi::api::core::v1::Secret>("openshift-cluster-api", "x"),
            Err(ManagerError::CacheRead(_))
        ));
    }
}
