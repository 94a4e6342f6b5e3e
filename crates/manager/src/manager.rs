//! The manager
//!
//! [`Manager::start`] brings the process up in this order:
//! 1. health probe and metrics listeners
//! 2. cache informers
//! 3. leader election, when enabled
//! 4. cache sync, then every registered [`Runnable`]
//!
//! It returns `Ok(())` once the shutdown signal fires and everything has
//! stopped, and an error when leadership is lost or a task fails.

use crate::cache::{Cache, CacheInformers};
use crate::error::ManagerError;
use crate::healthz::{self, CheckSet};
use crate::leader_election::{default_identity, LeaderElector};
use crate::metrics::Metrics;
use crate::options::{parse_bind_address, ManagerOptions};
use crate::runnable::Runnable;
use crate::signals::ShutdownSignal;
use axum::Router;
use kube::Client;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long stopping tasks may take before they are aborted.
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Named tasks whose first failure ends the manager.
struct TaskGroup {
    tasks: JoinSet<Result<(), ManagerError>>,
    names: HashMap<task::Id, String>,
}

impl TaskGroup {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            names: HashMap::new(),
        }
    }

    fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = Result<(), ManagerError>> + Send + 'static,
    {
        let handle = self.tasks.spawn(future);
        self.names.insert(handle.id(), name.into());
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Completes with the first task that fails or panics. Tasks that finish
    /// cleanly are dropped; once none are left this never completes.
    async fn next_failure(&mut self) -> ManagerError {
        loop {
            match self.tasks.join_next_with_id().await {
                Some(Ok((id, Ok(())))) => {
                    if let Some(name) = self.names.remove(&id) {
                        info!("{} finished", name);
                    }
                }
                Some(Ok((id, Err(e)))) => {
                    let name = self.names.remove(&id).unwrap_or_default();
                    error!("{} failed: {}", name, e);
                    return e;
                }
                Some(Err(e)) => {
                    let name = self.names.remove(&e.id()).unwrap_or_default();
                    return ManagerError::Runnable {
                        name,
                        reason: e.to_string(),
                    };
                }
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// Waits up to [`GRACEFUL_SHUTDOWN_TIMEOUT`] for every task, then aborts
    /// what is left.
    async fn shutdown(mut self, what: &str) {
        let drained = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} {} did not stop within {:?}, aborting",
                self.tasks.len(),
                what,
                GRACEFUL_SHUTDOWN_TIMEOUT
            );
            self.tasks.abort_all();
        }
    }
}

/// Hosts the cache, leader election, probe and metrics servers, and the
/// runnables of one controller process.
pub struct Manager {
    config: kube::Config,
    client: Client,
    cache: Cache,
    informers: CacheInformers,
    metrics: Arc<Metrics>,
    healthz: CheckSet,
    readyz: CheckSet,
    runnables: Vec<Runnable>,
    elector: Option<LeaderElector>,
    health_probe_addr: Option<SocketAddr>,
    metrics_addr: Option<SocketAddr>,
}

impl Manager {
    /// Validates `options` and builds a manager. Nothing talks to the API
    /// server until [`Manager::start`].
    pub fn new(config: kube::Config, options: ManagerOptions) -> Result<Self, ManagerError> {
        options.leader_election.validate()?;
        let health_probe_addr = parse_bind_address(&options.health_probe_bind_address)?;
        let metrics_addr = parse_bind_address(&options.metrics_bind_address)?;

        let client = Client::try_from(config.clone())?;
        let metrics = Metrics::new()?;
        let (cache, informers) =
            Cache::build(client.clone(), &options.scheme, &options.cache, metrics.clone())?;

        let elector = options.leader_election.leader_elect.then(|| {
            let elector =
                LeaderElector::new(client.clone(), &options.leader_election, default_identity());
            info!(
                "Leader election enabled for lease {} as {}",
                elector.lease_key(),
                elector.identity()
            );
            elector
        });

        Ok(Self {
            config,
            client,
            cache,
            informers,
            metrics: Arc::new(metrics),
            healthz: CheckSet::new("healthz"),
            readyz: CheckSet::new("readyz"),
            runnables: Vec::new(),
            elector,
            health_probe_addr,
            metrics_addr,
        })
    }

    /// Connection settings the manager was built from.
    pub fn config(&self) -> &kube::Config {
        &self.config
    }

    /// API client shared by everything the manager runs.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Read side of the object cache.
    pub fn cache(&self) -> Cache {
        self.cache.clone()
    }

    /// Metrics registry served at `/metrics`.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Registers a liveness check.
    pub fn add_healthz_check<F>(&mut self, name: &str, check: F) -> Result<(), ManagerError>
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.healthz.add(name, Arc::new(check))
    }

    /// Registers a readiness check.
    pub fn add_readyz_check<F>(&mut self, name: &str, check: F) -> Result<(), ManagerError>
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.readyz.add(name, Arc::new(check))
    }

    /// Registered liveness check names.
    pub fn healthz_checks(&self) -> Vec<String> {
        self.healthz.names()
    }

    /// Registered readiness check names.
    pub fn readyz_checks(&self) -> Vec<String> {
        self.readyz.names()
    }

    /// Adds a runnable, started once this replica leads.
    pub fn add(&mut self, runnable: Runnable) {
        self.runnables.push(runnable);
    }

    /// Whether this manager campaigns for a lease before running anything.
    pub fn leader_election_enabled(&self) -> bool {
        self.elector.is_some()
    }

    /// Runs until `shutdown` fires or something fails.
    pub async fn start(self, shutdown: ShutdownSignal) -> Result<(), ManagerError> {
        let stop = shutdown.child_token();
        let mut background = TaskGroup::new();

        if let Some(addr) = self.health_probe_addr {
            let router = healthz::router(self.healthz, self.readyz);
            let server = serve("health probe", addr, router, stop.clone()).await?;
            background.spawn("health probe server", server);
        }
        if let Some(addr) = self.metrics_addr {
            let router = Arc::clone(&self.metrics).router();
            let server = serve("metrics", addr, router, stop.clone()).await?;
            background.spawn("metrics server", server);
        }

        let informers = self.informers;
        let informer_stop = stop.clone();
        background.spawn("cache", async move {
            informers.run(informer_stop).await;
            Ok(())
        });

        let result = tokio::select! {
            result = lead_and_run(self.elector, self.cache, self.metrics, self.runnables, stop.clone()) => result,
            e = background.next_failure() => Err(e),
        };

        stop.cancel();
        background.shutdown("background tasks").await;
        match &result {
            Ok(()) => info!("Manager stopped"),
            Err(e) => error!("Manager stopped with error: {}", e),
        }
        result
    }
}

/// Binds `addr` and returns the server future, which stops when `stop` fires.
async fn serve(
    server: &'static str,
    addr: SocketAddr,
    router: Router,
    stop: CancellationToken,
) -> Result<impl Future<Output = Result<(), ManagerError>> + Send + 'static, ManagerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ManagerError::Bind { addr, source })?;
    info!("Starting {} server on {}", server, addr);

    Ok(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
            .map_err(|source| ManagerError::Server { server, source })
    })
}

/// Campaigns for leadership, waits for the cache, runs the runnables and keeps
/// the lease until `stop` fires.
async fn lead_and_run(
    elector: Option<LeaderElector>,
    cache: Cache,
    metrics: Arc<Metrics>,
    runnables: Vec<Runnable>,
    stop: CancellationToken,
) -> Result<(), ManagerError> {
    if let Some(elector) = &elector {
        metrics.set_leader(&elector.lease_key(), false);
        if !elector.acquire(&stop).await {
            info!("Stopped before acquiring lease {}", elector.lease_key());
            return Ok(());
        }
        metrics.set_leader(&elector.lease_key(), true);
    }

    tokio::select! {
        () = stop.cancelled() => return Ok(()),
        synced = cache.wait_for_cache_sync() => synced?,
    }
    info!("Cache synced");

    let mut running = TaskGroup::new();
    for runnable in runnables {
        let (name, start) = runnable.into_parts();
        info!("Starting {}", name);
        let future = start(cache.clone(), stop.clone());
        let task_name = name.clone();
        running.spawn(name, async move {
            future.await.map_err(|e| ManagerError::Runnable {
                name: task_name,
                reason: e.to_string(),
            })
        });
    }
    info!("Started {} runnables", running.len());

    let hold = async {
        match &elector {
            Some(elector) => elector.hold(&stop).await,
            None => {
                stop.cancelled().await;
                Ok(())
            }
        }
    };
    let result = tokio::select! {
        held = hold => held,
        e = running.next_failure() => Err(e),
    };

    if let Some(elector) = &elector {
        if let Err(ManagerError::LeaderElectionLost(reason)) = &result {
            error!("{}", reason);
            metrics.set_leader(&elector.lease_key(), false);
        }
    }

    stop.cancel();
    running.shutdown("runnables").await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::leader_election::LeaderElectionConfig;
    use crate::scheme::Scheme;

    fn unreachable_config() -> kube::Config {
        kube::Config::new("http://127.0.0.1:9".parse().expect("valid uri"))
    }

    fn options() -> ManagerOptions {
        ManagerOptions {
            scheme: Scheme::new(),
            cache: CacheOptions::single_namespace("openshift-cluster-api", Duration::from_secs(600)),
            leader_election: LeaderElectionConfig::default(),
            health_probe_bind_address: "0".to_string(),
            metrics_bind_address: "0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_bind_address() {
        let result = Manager::new(
            unreachable_config(),
            ManagerOptions {
                health_probe_bind_address: "not-an-address".to_string(),
                ..options()
            },
        );
        assert!(matches!(result, Err(ManagerError::InvalidBindAddress { .. })));
    }

    #[tokio::test]
    async fn test_checks_are_registered_by_name() {
        let mut manager = Manager::new(unreachable_config(), options()).expect("manager");
        manager.add_healthz_check("health", healthz::ping).expect("healthz");
        manager.add_readyz_check("check", healthz::ping).expect("readyz");

        assert!(manager.add_readyz_check("check", healthz::ping).is_err());
        assert_eq!(manager.healthz_checks(), vec!["health".to_string()]);
        assert_eq!(manager.readyz_checks(), vec!["check".to_string()]);
        assert!(!manager.leader_election_enabled());
    }

    #[tokio::test]
    async fn test_task_group_reports_failing_task_by_name() {
        let mut group = TaskGroup::new();
        group.spawn("fine", async { Ok(()) });
        group.spawn("broken", async {
            Err(ManagerError::CacheSync("watch closed".to_string()))
        });

        let failure = group.next_failure().await;
        assert!(matches!(failure, ManagerError::CacheSync(_)));
    }
}
