use crate::registry::{LoadError, TenantRegistry};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug)]
pub enum Command {
    // Reload outside of the normal interval.
    // The worker replies with the new generation once the attempt finishes.
    Reload(oneshot::Sender<Result<u64, LoadError>>),
    // Stop the worker
    Shutdown,
}

/// Handle to the background task that owns registry reloads.
pub struct Reloader {
    tx: mpsc::Sender<Command>,
    handle: tokio::task::JoinHandle<()>,
}

impl Reloader {
    /// Spawns the reload worker. With an interval the registry is also
    /// reloaded periodically; otherwise only on demand.
    pub fn spawn(registry: TenantRegistry, interval: Option<Duration>) -> Self {
        // Channel to send commands to the worker.
        let (tx, rx) = mpsc::channel::<Command>(16);

        let handle = tokio::spawn(async move {
            run_worker(registry, rx, interval).await;
        });

        Reloader { tx, handle }
    }

    pub async fn reload(&self) -> Result<u64, LoadError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Reload(reply_tx))
            .await
            .map_err(|_| LoadError::ReloaderStopped)?;
        reply_rx.await.map_err(|_| LoadError::ReloaderStopped)?
    }

    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown).await;
        let _ = self.handle.await;
    }
}

async fn run_worker(
    registry: TenantRegistry,
    mut rx: mpsc::Receiver<Command>,
    interval: Option<Duration>,
) {
    let mut ticker = interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let cmd = match ticker.as_mut() {
            Some(ticker) => {
                tokio::select! {
                    cmd = rx.recv() => cmd,
                    _ = ticker.tick() => {
                        // Failures are logged by the registry
                        let _ = registry.reload().await;
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        match cmd {
            Some(Command::Reload(reply)) => {
                let _ = reply.send(registry.reload().await);
            }
            Some(Command::Shutdown) | None => {
                tracing::debug!("registry reloader stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceError, TenantSource};
    use crate::types::Tenant;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        loads: AtomicUsize,
    }

    impl TenantSource for CountingSource {
        fn load(&self) -> Result<Vec<Tenant>, SourceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Tenant::new("acme", "Acme")])
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    #[tokio::test]
    async fn test_reload_on_demand() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });
        let registry = TenantRegistry::load(source.clone()).unwrap();
        let reloader = Reloader::spawn(registry.clone(), None);

        assert_eq!(reloader.reload().await.unwrap(), 2);
        assert_eq!(reloader.reload().await.unwrap(), 3);
        assert_eq!(registry.generation(), 3);
        assert_eq!(source.loads.load(Ordering::SeqCst), 3);

        reloader.shutdown().await;
    }

    #[tokio::test]
    async fn test_periodic_reload() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });
        let registry = TenantRegistry::load(source.clone()).unwrap();
        let reloader = Reloader::spawn(registry.clone(), Some(Duration::from_millis(20)));

        for _ in 0..50 {
            if registry.generation() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(registry.generation() >= 3);

        reloader.shutdown().await;
    }

    #[tokio::test]
    async fn test_stopped_reloader() {
        let registry = TenantRegistry::from_tenants(vec![Tenant::new("acme", "Acme")]).unwrap();
        let mut reloader = Reloader::spawn(registry, None);
        reloader.handle.abort();
        let _ = (&mut reloader.handle).await;
        assert!(matches!(
            reloader.reload().await,
            Err(LoadError::ReloaderStopped)
        ));
    }
}
