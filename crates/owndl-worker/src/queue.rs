//! Single-flight request queue
//!
//! One background task owns the resolver and processes links strictly in
//! arrival order, so at most one resolver call is outstanding at any time.
//! Each request waits a politeness delay first and is retried with a linear
//! backoff.

use crate::resolver::{ResolveError, Resolver};
use owndl_core::protocol::MediaItem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_retry::Retry;
use tracing::{debug, info, warn};

/// Terminal outcome of one queued request.
pub type ResolveResult = Result<Vec<MediaItem>, ResolveError>;

/// Queue timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Delay before the first resolver call of every request.
    pub request_delay: Duration,
    /// Retries after the first failure.
    pub max_retries: usize,
    /// Base retry delay, multiplied by the attempt number.
    pub retry_delay: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_secs(1),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Retry delays `base × 1, base × 2, …, base × retries`.
pub fn linear_backoff(base: Duration, retries: usize) -> impl Iterator<Item = Duration> {
    (1..=retries).map(move |attempt| base.saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX)))
}

struct Job {
    url: String,
    reply: oneshot::Sender<ResolveResult>,
}

/// Handle to the request queue; cheap to clone.
#[derive(Clone)]
pub struct RequestQueue {
    jobs: mpsc::UnboundedSender<Job>,
}

impl RequestQueue {
    /// Starts the queue task.
    ///
    /// The task ends once every handle is dropped and the backlog is drained.
    #[must_use]
    pub fn spawn(resolver: Arc<dyn Resolver>, settings: QueueSettings) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(resolver, settings, rx));
        Self { jobs }
    }

    /// Queues `url` and returns a receiver for its single terminal outcome.
    #[must_use]
    pub fn enqueue(&self, url: String) -> oneshot::Receiver<ResolveResult> {
        let (reply, rx) = oneshot::channel();
        if let Err(e) = self.jobs.send(Job { url, reply }) {
            // The reply sender is dropped with the job, so the receiver reports closure
            warn!(url = %e.0.url, "Request queue is closed");
        }
        rx
    }

    /// Queues `url` and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the terminal `ResolveError`, or `ResolveError::QueueClosed` if
    /// the queue stopped first.
    pub async fn submit(&self, url: String) -> ResolveResult {
        self.enqueue(url)
            .await
            .unwrap_or(Err(ResolveError::QueueClosed))
    }
}

async fn run(
    resolver: Arc<dyn Resolver>,
    settings: QueueSettings,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = jobs.recv().await {
        let result = process(resolver.as_ref(), &settings, &job.url).await;
        if job.reply.send(result).is_err() {
            debug!(url = %job.url, "Requester went away before the result");
        }
    }
    debug!("Request queue stopped");
}

async fn process(resolver: &dyn Resolver, settings: &QueueSettings, url: &str) -> ResolveResult {
    tokio::time::sleep(settings.request_delay).await;

    let max_attempts = settings.max_retries + 1;
    let mut attempt = 0;
    let action = || {
        attempt += 1;
        let current = attempt;
        async move {
            resolver.resolve(url).await.map_err(|e| {
                warn!(url, attempt = current, max_attempts, error = %e, "Resolver call failed");
                e
            })
        }
    };

    let strategy = linear_backoff(settings.retry_delay, settings.max_retries);
    let result = Retry::spawn(strategy, action).await;
    match &result {
        Ok(items) => info!(url, items = items.len(), "Link resolved"),
        Err(e) => warn!(url, error = %e, "Giving up on link"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MockResolver;
    use async_trait::async_trait;
    use mockall::Sequence;
    use owndl_core::protocol::MediaSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_settings(max_retries: usize) -> QueueSettings {
        QueueSettings {
            request_delay: Duration::from_millis(1),
            max_retries,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn video(url: &str) -> Vec<MediaItem> {
        vec![MediaItem::Video(MediaSource::Remote(url.to_string()))]
    }

    #[test]
    fn test_linear_backoff() {
        let delays: Vec<Duration> = linear_backoff(Duration::from_secs(2), 3).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(6)
            ]
        );
        assert_eq!(linear_backoff(Duration::from_secs(2), 0).count(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_one_failure_yields_single_success() {
        let mut resolver = MockResolver::new();
        let mut seq = Sequence::new();
        resolver
            .expect_resolve()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ResolveError::Status(502)));
        resolver
            .expect_resolve()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(video("https://v/ok.mp4")));

        let queue = RequestQueue::spawn(Arc::new(resolver), fast_settings(3));
        let mut rx = queue.enqueue("https://vt.tiktok.com/a/".to_string());

        let result = (&mut rx).await;
        assert!(matches!(result, Ok(Ok(ref items)) if items == &video("https://v/ok.mp4")));
        // Exactly one terminal outcome: the channel is consumed
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(3)
            .returning(|_| Err(ResolveError::NoMedia));

        let queue = RequestQueue::spawn(Arc::new(resolver), fast_settings(2));
        let result = queue.submit("https://youtu.be/x".to_string()).await;
        assert!(matches!(result, Err(ResolveError::NoMedia)));
    }

    struct SlowResolver {
        active: AtomicUsize,
        peak: AtomicUsize,
        order: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Resolver for SlowResolver {
        async fn resolve(&self, url: &str) -> Result<Vec<MediaItem>, ResolveError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Ok(mut order) = self.order.lock() {
                order.push(url.to_string());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(video(url))
        }
    }

    #[tokio::test]
    async fn test_fifo_single_flight() {
        let resolver = Arc::new(SlowResolver {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            order: std::sync::Mutex::new(Vec::new()),
        });
        let queue = RequestQueue::spawn(resolver.clone(), fast_settings(0));

        let receivers: Vec<_> = (0..5)
            .map(|i| queue.enqueue(format!("https://link/{i}")))
            .collect();
        for (i, rx) in receivers.into_iter().enumerate() {
            let result = rx.await;
            assert!(matches!(result, Ok(Ok(ref items)) if items == &video(&format!("https://link/{i}"))));
        }

        assert_eq!(resolver.peak.load(Ordering::SeqCst), 1);
        let order = resolver.order.lock().map(|o| o.clone()).unwrap_or_default();
        let expected: Vec<String> = (0..5).map(|i| format!("https://link/{i}")).collect();
        assert_eq!(order, expected);
    }
}
