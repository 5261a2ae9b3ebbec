use crate::services::storage::TransientStorage;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Sweeps scratch files a crashed or killed request left behind.
pub struct BackgroundWorker {
    storage: Arc<TransientStorage>,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        storage: Arc<TransientStorage>,
        max_age: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            max_age,
            interval: Duration::from_secs(3600),
            shutdown,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");
        self.perform_cleanup().await;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) -> usize {
        tracing::debug!("🧹 Sweeping stale scratch entries...");
        let removed = self.storage.sweep_stale(self.max_age).await;
        if removed > 0 {
            tracing::info!("✅ Removed {} stale scratch entries", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_worker_sweeps_and_stops() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Arc::new(TransientStorage::new(
            tmp.path().join("uploads"),
            tmp.path().join("output"),
        ));
        storage.ensure_roots().await.unwrap();
        std::fs::write(storage.uploads_root().join("orphan.txt"), b"left over").unwrap();
        std::fs::create_dir(storage.output_root().join("orphan-request")).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = BackgroundWorker::new(storage.clone(), Duration::ZERO, shutdown_rx)
            .with_interval(Duration::from_millis(10));
        let handle = tokio::spawn(worker.run());

        sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(std::fs::read_dir(storage.uploads_root()).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(storage.output_root()).unwrap().count(), 0);
    }
}
