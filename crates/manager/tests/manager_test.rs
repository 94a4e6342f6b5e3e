//! Manager lifecycle against an API server that never answers, or that only
//! answers the first Lease write.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use manager::{
    healthz, CacheOptions, LeaderElectionConfig, Manager, ManagerError, ManagerOptions, Runnable,
    Scheme, ShutdownSignal,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn unreachable_config() -> kube::Config {
    kube::Config::new("http://127.0.0.1:9".parse().expect("valid uri"))
}

fn leader_election() -> LeaderElectionConfig {
    LeaderElectionConfig {
        leader_elect: true,
        lease_duration: Duration::from_secs(15),
        renew_deadline: Duration::from_secs(10),
        retry_period: Duration::from_secs(2),
        resource_name: "machine-api-migration-leader".to_string(),
        resource_namespace: "openshift-cluster-api".to_string(),
        ..LeaderElectionConfig::default()
    }
}

fn options(health: &str, metrics: &str) -> ManagerOptions {
    ManagerOptions {
        scheme: Scheme::new(),
        cache: CacheOptions::single_namespace("openshift-cluster-api", Duration::from_secs(600)),
        leader_election: leader_election(),
        health_probe_bind_address: health.to_string(),
        metrics_bind_address: metrics.to_string(),
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("free port")
        .port()
}

async fn http_get(port: u16, path: &str) -> String {
    for _ in 0..50 {
        if let Ok(mut stream) = TcpStream::connect(("127.0.0.1", port)).await {
            let request =
                format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
            stream.write_all(request.as_bytes()).await.expect("write request");
            let mut response = String::new();
            stream.read_to_string(&mut response).await.expect("read response");
            return response;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("nothing listening on port {port}");
}

#[tokio::test]
async fn test_lease_duration_must_exceed_renew_deadline() {
    let mut options = options("0", "0");
    options.leader_election.lease_duration = Duration::from_secs(1);
    options.leader_election.renew_deadline = Duration::from_secs(2);

    let err = Manager::new(unreachable_config(), options)
        .err()
        .expect("invalid durations are rejected");
    assert!(matches!(err, ManagerError::InvalidLeaderElection(_)));
    assert!(err.to_string().contains("leaseDuration"));
}

#[tokio::test]
async fn test_shutdown_while_campaigning_is_clean() {
    let started = Arc::new(AtomicBool::new(false));
    let mut manager = Manager::new(unreachable_config(), options("0", "0")).expect("manager");
    let flag = Arc::clone(&started);
    manager.add(Runnable::new("migration", move |_cache, stop| async move {
        flag.store(true, Ordering::SeqCst);
        stop.cancelled().await;
        Ok(())
    }));

    let shutdown = ShutdownSignal::new();
    let running = tokio::spawn(manager.start(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.trigger();

    let result = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("manager stops")
        .expect("manager task did not panic");
    assert!(result.is_ok(), "unexpected error: {result:?}");
    assert!(
        !started.load(Ordering::SeqCst),
        "runnables must not start before the lease is held"
    );
}

#[tokio::test]
async fn test_probes_and_metrics_are_served_before_leadership() {
    let health_port = free_port();
    let metrics_port = free_port();
    let mut manager = Manager::new(
        unreachable_config(),
        options(
            &format!("127.0.0.1:{health_port}"),
            &format!("127.0.0.1:{metrics_port}"),
        ),
    )
    .expect("manager");
    manager.add_healthz_check("health", healthz::ping).expect("healthz");
    manager.add_readyz_check("check", healthz::ping).expect("readyz");

    let shutdown = ShutdownSignal::new();
    let running = tokio::spawn(manager.start(shutdown.clone()));

    let response = http_get(health_port, "/healthz").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let response = http_get(health_port, "/readyz/check").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let response = http_get(health_port, "/readyz/unknown").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    let response = http_get(metrics_port, "/metrics").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("leader_election_master_status"), "{response}");

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("manager stops")
        .expect("manager task did not panic");
    assert!(result.is_ok(), "unexpected error: {result:?}");
}

#[tokio::test]
async fn test_occupied_probe_port_fails_start() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let manager = Manager::new(unreachable_config(), options(&format!("127.0.0.1:{port}"), "0"))
        .expect("manager");
    let err = manager
        .start(ShutdownSignal::new())
        .await
        .err()
        .expect("port is taken");
    assert!(matches!(err, ManagerError::Bind { .. }));
    drop(listener);
}

fn status_body(code: u16, reason: &str) -> String {
    format!(
        r#"{{"kind":"Status","apiVersion":"v1","metadata":{{}},"status":"Failure","message":"{reason}","reason":"{reason}","code":{code}}}"#
    )
}

/// API server that lets the first caller create the Lease and then fails
/// every further request.
async fn lease_then_outage(
    State(created): State<Arc<AtomicBool>>,
    method: Method,
    body: Bytes,
) -> impl IntoResponse {
    if !created.load(Ordering::SeqCst) {
        if method == Method::GET {
            return (StatusCode::NOT_FOUND, status_body(404, "NotFound")).into_response();
        }
        if method == Method::POST {
            created.store(true, Ordering::SeqCst);
            return (StatusCode::CREATED, body).into_response();
        }
    }
    (StatusCode::INTERNAL_SERVER_ERROR, status_body(500, "InternalError")).into_response()
}

#[tokio::test]
async fn test_lost_lease_stops_manager_with_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let created = Arc::new(AtomicBool::new(false));
    let api = Router::new()
        .fallback(lease_then_outage)
        .with_state(Arc::clone(&created));
    tokio::spawn(async move { axum::serve(listener, api).await });

    let config = kube::Config::new(format!("http://{addr}").parse().expect("valid uri"));
    let mut options = options("0", "0");
    options.leader_election.lease_duration = Duration::from_millis(1000);
    options.leader_election.renew_deadline = Duration::from_millis(400);
    options.leader_election.retry_period = Duration::from_millis(100);

    let started = Arc::new(AtomicBool::new(false));
    let stopped = Arc::new(AtomicBool::new(false));
    let mut manager = Manager::new(config, options).expect("manager");
    let (on_start, on_stop) = (Arc::clone(&started), Arc::clone(&stopped));
    manager.add(Runnable::new("migration", move |_cache, stop| async move {
        on_start.store(true, Ordering::SeqCst);
        stop.cancelled().await;
        on_stop.store(true, Ordering::SeqCst);
        Ok(())
    }));

    let running = manager.start(ShutdownSignal::new());
    let result = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("manager stops once the lease is lost");

    assert!(created.load(Ordering::SeqCst), "lease was created");
    assert!(started.load(Ordering::SeqCst), "runnables start once leading");
    assert!(stopped.load(Ordering::SeqCst), "runnables are stopped on loss");
    assert!(
        matches!(result, Err(ManagerError::LeaderElectionLost(_))),
        "unexpected result: {result:?}"
    );
}
