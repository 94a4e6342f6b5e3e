//! Prometheus metrics
//!
//! Process-wide registry served at `/metrics`. Collaborators register their
//! own collectors through [`Metrics::registry`].

use crate::error::ManagerError;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::warn;

/// Metrics owned by the manager.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    leader: IntGaugeVec,
    resyncs: IntCounterVec,
}

impl Metrics {
    /// Creates a registry holding the manager's own collectors.
    pub fn new() -> Result<Self, ManagerError> {
        let registry = Registry::new();

        let leader = IntGaugeVec::new(
            Opts::new(
                "leader_election_master_status",
                "Gauge of if the reporting system is master of the relevant lease, 0 indicates backup, 1 indicates master.",
            ),
            &["name"],
        )?;
        let resyncs = IntCounterVec::new(
            Opts::new("cache_resyncs_total", "Number of periodic cache resyncs."),
            &["namespace"],
        )?;

        registry.register(Box::new(leader.clone()))?;
        registry.register(Box::new(resyncs.clone()))?;

        Ok(Self {
            registry,
            leader,
            resyncs,
        })
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records whether this replica leads `lease`.
    pub fn set_leader(&self, lease: &str, leading: bool) {
        self.leader.with_label_values(&[lease]).set(i64::from(leading));
    }

    /// Counts a resync of the cache for `namespace`.
    pub fn record_resync(&self, namespace: &str) {
        self.resyncs.with_label_values(&[namespace]).inc();
    }

    /// All metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, ManagerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Router serving `/metrics`.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/metrics", get(serve_metrics)).with_state(self)
    }
}

async fn serve_metrics(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn test_leader_gauge_rendered() {
        let metrics = Metrics::new().expect("metrics");
        metrics.set_leader("machine-api-migration-leader", true);

        let text = metrics.render().expect("render");
        assert!(text.contains(
            "leader_election_master_status{name=\"machine-api-migration-leader\"} 1"
        ));

        metrics.set_leader("machine-api-migration-leader", false);
        let text = metrics.render().expect("render");
        assert!(text.contains(
            "leader_election_master_status{name=\"machine-api-migration-leader\"} 0"
        ));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(Metrics::new().expect("metrics"));
        metrics.record_resync("openshift-cluster-api");

        let response = Arc::clone(&metrics)
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("cache_resyncs_total{namespace=\"openshift-cluster-api\"} 1"));
    }
}
