//! Cancellation signal shared by the scheduler loop and the orchestrator

use tokio::sync::watch;
use tracing::{info, warn};

/// Receiving side: checked between probes and awaited during the sleep
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested. A dropped trigger never resolves.
    pub async fn requested(&mut self) {
        if self.is_requested() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // receivers may all be gone already
        let _ = self.tx.send(true);
    }

    /// Trigger on Ctrl-C, and on SIGTERM where available
    pub fn listen_for_signals(self) {
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Shutdown signal received, finishing current probe");
            self.trigger();
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Could not install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_is_observed() {
        let (trigger, mut shutdown) = Shutdown::channel();
        assert!(!shutdown.is_requested());

        trigger.trigger();
        assert!(shutdown.is_requested());
        tokio::time::timeout(Duration::from_secs(1), shutdown.requested())
            .await
            .expect("shutdown should resolve immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trigger_never_resolves() {
        let (trigger, mut shutdown) = Shutdown::channel();
        drop(trigger);
        let waited = tokio::time::timeout(Duration::from_secs(5), shutdown.requested()).await;
        assert!(waited.is_err());
    }
}
