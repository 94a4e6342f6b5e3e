//! Shutdown signal
//!
//! A level-triggered, one-shot notification derived from SIGTERM/SIGINT.
//! Once fired it stays fired; every clone observes it.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// One-shot shutdown notification shared by the idle path and the manager.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Firing twice is a no-op.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the signal has fired.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// A token cancelled when the signal fires, which can also be cancelled on
    /// its own without firing the signal.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Installs SIGTERM and SIGINT handlers and returns the signal they fire.
///
/// The handlers are registered before this function returns. The first signal
/// fires the returned [`ShutdownSignal`]; a second one exits the process with
/// status 1.
pub fn setup_signal_handler() -> std::io::Result<ShutdownSignal> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let shutdown = ShutdownSignal::new();
    let fired = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => info!("Received SIGTERM, shutting down"),
            _ = interrupt.recv() => info!("Received SIGINT, shutting down"),
        }
        fired.trigger();

        tokio::select! {
            _ = terminate.recv() => {}
            _ = interrupt.recv() => {}
        }
        error!("Received second termination signal, exiting immediately");
        std::process::exit(1);
    });

    Ok(shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_signal_is_level_triggered() {
        let shutdown = ShutdownSignal::new();
        let observer = shutdown.clone();
        assert!(!observer.is_triggered());

        shutdown.trigger();
        shutdown.trigger();

        assert!(observer.is_triggered());
        // A waiter arriving after the fact completes immediately.
        timeout(Duration::from_millis(100), observer.wait())
            .await
            .expect("wait completes once fired");
    }

    #[tokio::test]
    async fn test_child_token_follows_signal() {
        let shutdown = ShutdownSignal::new();
        let child = shutdown.child_token();
        let other = shutdown.child_token();

        other.cancel();
        assert!(!shutdown.is_triggered());
        assert!(!child.is_cancelled());

        shutdown.trigger();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_handler_does_not_fire_without_signal() {
        let shutdown = setup_signal_handler().expect("signal handlers install");
        let result = timeout(Duration::from_millis(100), shutdown.wait()).await;
        assert!(result.is_err(), "shutdown must not fire without a signal");
    }
}
