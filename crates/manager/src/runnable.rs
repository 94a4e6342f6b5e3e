//! Runnables
//!
//! Long-running tasks owned by the manager. They are started only once this
//! replica leads and the cache has synced, and are asked to stop through the
//! cancellation token they receive.

use crate::cache::Cache;
use futures::future::BoxFuture;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Error type runnables report.
pub type RunnableError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type StartFn =
    Box<dyn FnOnce(Cache, CancellationToken) -> BoxFuture<'static, Result<(), RunnableError>> + Send>;

/// A named task started by the manager after leadership is acquired.
pub struct Runnable {
    name: String,
    start: StartFn,
}

impl Runnable {
    /// Wraps `start`, which receives the synced cache and a stop token.
    pub fn new<F, Fut>(name: impl Into<String>, start: F) -> Self
    where
        F: FnOnce(Cache, CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), RunnableError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            start: Box::new(move |cache, stop| Box::pin(start(cache, stop))),
        }
    }

    /// Runnable name, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, StartFn) {
        (self.name, self.start)
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable").field("name", &self.name).finish_non_exhaustive()
    }
}
