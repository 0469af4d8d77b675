//! Periodic background jobs with cooperative cancellation.
//!
//! Each [`Worker`] runs one [`Job`] on a fixed interval. A run that exceeds
//! the tick timeout is abandoned and logged; the next tick starts fresh.
//! Stopping a worker cancels any in-flight run at its next await point, so
//! an open transaction is dropped (rolled back) rather than committed half
//! way.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<()>;
}

pub struct Worker {
    name: String,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Worker {
    /// Start `job` on its own task. The first run happens one `every` after spawn.
    pub fn spawn(job: Arc<dyn Job>, every: Duration, tick_timeout: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let name = job.name().to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            outcome = tokio::time::timeout(tick_timeout, job.run()) => match outcome {
                                Ok(Ok(())) => debug!("{} tick complete", job.name()),
                                Ok(Err(err)) => warn!("{} tick failed: {:#}", job.name(), err),
                                Err(_) => warn!("{} tick timed out (> {}s)", job.name(), tick_timeout.as_secs()),
                            },
                            _ = token.cancelled() => {
                                info!("{} cancelled mid-run", job.name());
                                break;
                            }
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
            debug!("{} worker stopped", job.name());
        });

        info!("Started {} worker (every {}s)", name, every.as_secs());
        Self {
            name,
            handle,
            cancel_token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancel the job and wait for its task to exit.
    pub async fn stop(mut self) -> Result<()> {
        self.cancel_token.cancel();
        (&mut self.handle)
            .await
            .with_context(|| format!("{} worker task panicked", self.name))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Job for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        async fn run(&self) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_runs_periodically_and_stops() {
        let job = Arc::new(Counter {
            runs: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let worker = Worker::spawn(
            job.clone(),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        worker.stop().await.unwrap();

        let runs = job.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected several runs, got {}", runs);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test]
    async fn test_stop_abandons_in_flight_run() {
        let job = Arc::new(Counter {
            runs: AtomicUsize::new(0),
            delay: Duration::from_secs(30),
        });
        let worker = Worker::spawn(
            job.clone(),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(2), worker.stop())
            .await
            .expect("stop should not wait for the in-flight run")
            .unwrap();
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
