//! Retry-with-backoff bootstrap driver.
//!
//! `AsyncStarter` runs a "try to (re)build the pipeline" closure on a
//! background task until it succeeds or is stopped, sleeping a bounded
//! exponential backoff between attempts. This is how continuous (realtime)
//! startup tolerates a downstream broker that is not yet reachable.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Retry timing for an [`AsyncStarter`].
#[derive(Debug, Clone)]
pub struct StarterConfig {
    /// Interval before the first retry. Defaults to 1 second.
    pub retry_interval: Duration,
    /// Upper bound the backoff grows to. Defaults to 30 seconds.
    pub max_retry_interval: Duration,
}

impl Default for StarterConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            max_retry_interval: Duration::from_secs(30),
        }
    }
}

impl StarterConfig {
    /// Set the initial retry interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the backoff upper bound.
    pub fn with_max_retry_interval(mut self, interval: Duration) -> Self {
        self.max_retry_interval = interval;
        self
    }
}

/// Background retry loop around a startup closure.
pub struct AsyncStarter {
    name: String,
    started: Arc<AtomicBool>,
    cancel: CancellationToken,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl AsyncStarter {
    /// Spawn the retry loop.
    ///
    /// `attempt` is called until it returns `true`; failed attempts sleep a
    /// backoff bounded by `config.max_retry_interval`. After the first
    /// success the task parks until [`AsyncStarter::stop`].
    pub fn spawn<F, Fut>(name: impl Into<String>, config: StarterConfig, mut attempt: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let name = name.into();
        let started = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let task_name = name.clone();
        let task_started = started.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut backoff = ExponentialBackoff {
                initial_interval: config.retry_interval,
                max_interval: config.max_retry_interval,
                max_elapsed_time: None,
                ..Default::default()
            };
            loop {
                if task_cancel.is_cancelled() {
                    return;
                }
                if attempt().await {
                    task_started.store(true, Ordering::SeqCst);
                    info!(starter = %task_name, "Startup succeeded");
                    task_cancel.cancelled().await;
                    return;
                }
                let delay = backoff
                    .next_backoff()
                    .unwrap_or(config.max_retry_interval);
                warn!(
                    starter = %task_name,
                    retry_in_ms = delay.as_millis() as u64,
                    "Startup attempt failed, retrying"
                );
                tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });

        Self {
            name,
            started,
            cancel,
            handle: StdMutex::new(Some(handle)),
        }
    }

    /// Whether the startup closure has succeeded at least once.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Cancel the retry loop and wait for the task to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(starter = %self.name, error = %e, "Starter task panicked");
            }
        }
    }
}

impl Drop for AsyncStarter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
