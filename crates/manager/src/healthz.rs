//! Health and readiness probes
//!
//! Named checkers grouped into a liveness set (`/healthz`) and a readiness set
//! (`/readyz`). Each set is served as a whole and per checker
//! (`/healthz/<name>`). A set without checkers answers as if it held a single
//! `ping` checker.
//!
//! Query parameters on the aggregate endpoints:
//! - `verbose`: list every checker's result even on success
//! - `exclude=<name>`: skip a checker (repeatable)

use crate::error::ManagerError;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::{Arc, PoisonError, RwLock};
use tower_http::trace::TraceLayer;
use tracing::debug;

/// A named probe; `Err` carries the failure reason.
pub type Checker = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// Checker that always succeeds.
pub fn ping() -> Result<(), String> {
    Ok(())
}

/// A set of named checkers served under one path.
#[derive(Clone)]
pub struct CheckSet {
    probe: &'static str,
    checks: Arc<RwLock<BTreeMap<String, Checker>>>,
}

impl CheckSet {
    /// Creates an empty set served under `/<probe>`.
    pub fn new(probe: &'static str) -> Self {
        Self {
            probe,
            checks: Arc::default(),
        }
    }

    /// Path segment this set is served under.
    pub fn probe(&self) -> &'static str {
        self.probe
    }

    /// Registers `checker` as `name`. Names must be unique and non-empty.
    pub fn add(&self, name: &str, checker: Checker) -> Result<(), ManagerError> {
        let reject = |reason: &str| ManagerError::CheckRegistration {
            probe: self.probe,
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(reject("checker name must not be empty"));
        }
        if name.contains('/') {
            return Err(reject("checker name must not contain '/'"));
        }

        let mut checks = self.checks.write().unwrap_or_else(PoisonError::into_inner);
        if checks.contains_key(name) {
            return Err(reject("a checker with this name already exists"));
        }
        checks.insert(name.to_string(), checker);
        Ok(())
    }

    /// Registered checker names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Runs every checker not in `excluded`.
    fn check_all(&self, verbose: bool, excluded: &BTreeSet<String>) -> Response {
        let checks = self.checks.read().unwrap_or_else(PoisonError::into_inner).clone();
        let checks: BTreeMap<String, Checker> = if checks.is_empty() {
            BTreeMap::from([("ping".to_string(), Arc::new(ping) as Checker)])
        } else {
            checks
        };

        let mut failed = false;
        let mut body = String::new();
        for (name, check) in &checks {
            if excluded.contains(name) {
                let _ = writeln!(body, "[+]{name} excluded: ok");
                continue;
            }
            match check() {
                Ok(()) => {
                    let _ = writeln!(body, "[+]{name} ok");
                }
                Err(reason) => {
                    failed = true;
                    debug!("{} check {} failed: {}", self.probe, name, reason);
                    let _ = writeln!(body, "[-]{name} failed: reason withheld");
                }
            }
        }
        for name in excluded.iter().filter(|name| !checks.contains_key(*name)) {
            let _ = writeln!(body, "warn: some health checks cannot be excluded: no matches for \"{name}\"");
        }

        if failed {
            let _ = writeln!(body, "{} check failed", self.probe);
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }
        if verbose {
            let _ = writeln!(body, "{} check passed", self.probe);
            return (StatusCode::OK, body).into_response();
        }
        (StatusCode::OK, "ok").into_response()
    }

    /// Runs the checker called `name`.
    fn check_one(&self, name: &str) -> Response {
        let check = self
            .checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        let check = match check {
            Some(check) => check,
            None if name == "ping" => Arc::new(ping) as Checker,
            None => return (StatusCode::NOT_FOUND, format!("no such check: {name}")).into_response(),
        };

        match check() {
            Ok(()) => (StatusCode::OK, "ok").into_response(),
            Err(reason) => {
                debug!("{} check {} failed: {}", self.probe, name, reason);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("internal server error: {reason}"),
                )
                    .into_response()
            }
        }
    }
}

/// Parses `verbose` and repeated `exclude=` from a raw query string.
fn parse_probe_query(query: Option<&str>) -> (bool, BTreeSet<String>) {
    let mut verbose = false;
    let mut excluded = BTreeSet::new();
    for pair in query.unwrap_or_default().split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "verbose" => verbose = value != "false" && value != "0",
            "exclude" if !value.is_empty() => {
                excluded.insert(value.to_string());
            }
            _ => {}
        }
    }
    (verbose, excluded)
}

async fn all_checks(State(set): State<CheckSet>, RawQuery(query): RawQuery) -> Response {
    let (verbose, excluded) = parse_probe_query(query.as_deref());
    set.check_all(verbose, &excluded)
}

async fn one_check(State(set): State<CheckSet>, Path(name): Path<String>) -> Response {
    set.check_one(&name)
}

fn check_set_routes(set: CheckSet) -> Router {
    let root = format!("/{}", set.probe());
    let named = format!("/{}/{{name}}", set.probe());
    Router::new()
        .route(&root, get(all_checks))
        .route(&named, get(one_check))
        .with_state(set)
}

/// Router serving `/healthz` and `/readyz`.
pub fn router(healthz: CheckSet, readyz: CheckSet) -> Router {
    Router::new()
        .merge(check_set_routes(healthz))
        .merge(check_set_routes(readyz))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_path(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("infallible");
        let status = response.status();
        let body = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    fn sets() -> (CheckSet, CheckSet) {
        (CheckSet::new("healthz"), CheckSet::new("readyz"))
    }

    #[tokio::test]
    async fn test_empty_sets_answer_ok() {
        let (healthz, readyz) = sets();
        let router = router(healthz, readyz);

        assert_eq!(get_path(router.clone(), "/healthz").await, (StatusCode::OK, "ok".to_string()));
        assert_eq!(get_path(router.clone(), "/readyz").await.0, StatusCode::OK);
        assert_eq!(get_path(router, "/readyz/ping").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_registered_checks_are_served() {
        let (healthz, readyz) = sets();
        healthz.add("health", Arc::new(ping)).expect("add health");
        readyz.add("check", Arc::new(ping)).expect("add check");
        let router = router(healthz, readyz);

        let (status, body) = get_path(router.clone(), "/healthz?verbose").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("[+]health ok"));
        assert!(body.contains("healthz check passed"));

        assert_eq!(get_path(router.clone(), "/readyz/check").await.0, StatusCode::OK);
        assert_eq!(get_path(router, "/readyz/missing").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failing_check_fails_probe() {
        let (healthz, readyz) = sets();
        readyz.add("check", Arc::new(ping)).expect("add check");
        readyz
            .add("cache", Arc::new(|| -> Result<(), String> { Err("not synced".to_string()) }))
            .expect("add cache");
        let router = router(healthz, readyz);

        let (status, body) = get_path(router.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("[-]cache failed"));
        assert!(body.contains("[+]check ok"));

        let (status, _) = get_path(router.clone(), "/readyz?exclude=cache").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get_path(router, "/readyz/cache").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("not synced"));
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let set = CheckSet::new("healthz");
        set.add("health", Arc::new(ping)).expect("first add");

        assert!(matches!(
            set.add("health", Arc::new(ping)),
            Err(ManagerError::CheckRegistration { probe: "healthz", .. })
        ));
        assert!(set.add("", Arc::new(ping)).is_err());
        assert!(set.add("a/b", Arc::new(ping)).is_err());
        assert_eq!(set.names(), vec!["health".to_string()]);
    }

    #[test]
    fn test_parse_probe_query() {
        let (verbose, excluded) = parse_probe_query(Some("verbose&exclude=a&exclude=b"));
        assert!(verbose);
        assert_eq!(excluded.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);

        let (verbose, excluded) = parse_probe_query(None);
        assert!(!verbose);
        assert!(excluded.is_empty());
    }
}
