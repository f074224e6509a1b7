//! Serialized request dispatcher.
//!
//! All outbound requests of the dashboard go through one [`RequestDispatcher`].
//! A single background task owns the queue and processes submissions strictly
//! in FIFO order:
//!
//! - consecutive dispatches of one drain are separated by the pacing interval
//! - each request gets up to `max_attempts` attempts, each bounded by the
//!   request timeout, with exponential backoff between attempts
//! - successes feed a bounded latency window, terminal failures bump a counter
//!
//! The handle is cheap to clone. When the last handle is dropped the queue
//! closes and the task exits after finishing the requests already queued.

mod metrics;
mod transport;

pub use metrics::{DispatcherStats, LatencyWindow};
pub use transport::{FetchResponse, HttpTransport, RequestOptions, ReqwestTransport};

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::errors::DispatchError;

/// Pacing never adapts below this interval.
const MIN_ADAPTIVE_PACING: Duration = Duration::from_millis(5_000);

/// Pacing never adapts above this interval.
const MAX_ADAPTIVE_PACING: Duration = Duration::from_millis(30_000);

/// Success rate (percent) above which pacing grows.
const HIGH_SUCCESS_RATE: f64 = 95.0;

/// Success rate (percent) below which pacing shrinks.
const LOW_SUCCESS_RATE: f64 = 80.0;

const PACING_GROWTH: f64 = 1.2;
const PACING_SHRINK: f64 = 0.8;

type Reply = oneshot::Sender<Result<FetchResponse, DispatchError>>;

/// A submission waiting in the dispatcher queue.
struct QueuedRequest {
    target: String,
    options: RequestOptions,
    reply: Reply,
}

/// State shared between the handle and the dispatch task.
#[derive(Debug)]
struct DispatchState {
    pacing_interval: Duration,
    latencies: LatencyWindow,
    succeeded: u64,
    failed: u64,
}

/// Lock the shared state, recovering from poison.
///
/// The state only holds counters and a pacing value, so a panic elsewhere
/// cannot leave it in a shape worth refusing to read.
fn lock_state(state: &Mutex<DispatchState>) -> MutexGuard<'_, DispatchState> {
    state.lock().unwrap_or_else(|poisoned| {
        warn!("Dispatcher state mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Handle to the request dispatch task.
#[derive(Clone)]
pub struct RequestDispatcher {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    state: Arc<Mutex<DispatchState>>,
    busy: Arc<AtomicBool>,
}

impl RequestDispatcher {
    /// Spawn the dispatch task on the current tokio runtime.
    pub fn spawn(transport: Arc<dyn HttpTransport>, config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(DispatchState {
            pacing_interval: config.pacing_interval,
            latencies: LatencyWindow::new(config.latency_window),
            succeeded: 0,
            failed: 0,
        }));
        let busy = Arc::new(AtomicBool::new(false));

        let worker = DispatchLoop {
            transport,
            config,
            state: state.clone(),
            busy: busy.clone(),
        };
        tokio::spawn(worker.run(rx));

        Self { tx, state, busy }
    }

    /// Queue a request.
    ///
    /// The request is enqueued before this returns, so submission order is
    /// the call order. The returned future resolves with the successful
    /// response or with the error of the final attempt.
    pub fn submit(&self, target: impl Into<String>, options: RequestOptions) -> PendingResponse {
        let (reply, rx) = oneshot::channel();
        let request = QueuedRequest {
            target: target.into(),
            options,
            reply,
        };
        if self.tx.send(request).is_err() {
            // The reply sender went down with the rejected request, so the
            // receiver resolves to `Shutdown`.
            warn!("Dispatcher task is gone, rejecting request");
        }
        PendingResponse { rx }
    }

    /// Mean latency of the recent successful requests, zero when there are none.
    pub fn average_latency(&self) -> Duration {
        lock_state(&self.state).latencies.average()
    }

    /// Number of requests that failed after exhausting their attempts.
    pub fn failure_count(&self) -> u64 {
        lock_state(&self.state).failed
    }

    pub fn pacing_interval(&self) -> Duration {
        lock_state(&self.state).pacing_interval
    }

    pub fn stats(&self) -> DispatcherStats {
        let state = lock_state(&self.state);
        DispatcherStats {
            succeeded: state.succeeded,
            failed: state.failed,
            samples: state.latencies.len(),
            average_latency: state.latencies.average(),
            pacing_interval: state.pacing_interval,
        }
    }

    /// True while the task is draining the queue.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Retune the pacing interval.
    ///
    /// A positive recommendation (in seconds) is taken as is. Zero, negative,
    /// NaN or out-of-range recommendations are ignored. Without a usable one
    /// the interval grows by 20% above a 95% success rate, shrinks by 20%
    /// below 80%, and is clamped to 5..=30 seconds when it moves.
    pub fn adjust_pacing(&self, success_rate: f64, recommended_interval_secs: Option<f64>) {
        let mut state = lock_state(&self.state);
        let previous = state.pacing_interval;
        state.pacing_interval =
            next_pacing_interval(previous, success_rate, recommended_interval_secs);

        if state.pacing_interval != previous {
            info!(
                success_rate,
                "Pacing interval adjusted from {:?} to {:?}", previous, state.pacing_interval
            );
        }
    }
}

/// Future returned by [`RequestDispatcher::submit`].
#[must_use = "the request is dispatched regardless, but its outcome is only observable by awaiting"]
pub struct PendingResponse {
    rx: oneshot::Receiver<Result<FetchResponse, DispatchError>>,
}

impl Future for PendingResponse {
    type Output = Result<FetchResponse, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(DispatchError::Shutdown)))
    }
}

/// Compute the pacing interval after a success-rate report.
pub fn next_pacing_interval(
    current: Duration,
    success_rate: f64,
    recommended_interval_secs: Option<f64>,
) -> Duration {
    if let Some(interval) = recommended_interval_secs
        .filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
    {
        return interval;
    }

    if success_rate > HIGH_SUCCESS_RATE {
        scale(current, PACING_GROWTH).min(MAX_ADAPTIVE_PACING)
    } else if success_rate < LOW_SUCCESS_RATE {
        scale(current, PACING_SHRINK).max(MIN_ADAPTIVE_PACING)
    } else {
        current
    }
}

fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::from_nanos((duration.as_nanos() as f64 * factor).round() as u64)
}

/// Delay before the retry that follows the failed attempt `attempt_index`
/// (zero-based): `base * 2^attempt_index`.
pub fn backoff_delay(base: Duration, attempt_index: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt_index))
}

/// The dispatch task. Owns the receiving end of the queue.
struct DispatchLoop {
    transport: Arc<dyn HttpTransport>,
    config: DispatcherConfig,
    state: Arc<Mutex<DispatchState>>,
    busy: Arc<AtomicBool>,
}

impl DispatchLoop {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<QueuedRequest>) {
        while let Some(first) = rx.recv().await {
            self.busy.store(true, Ordering::Release);

            let mut next = Some(first);
            while let Some(request) = next.take() {
                self.dispatch(request).await;

                // Pace only between requests of the same drain; a request
                // arriving at an idle queue goes out immediately.
                if let Ok(queued) = rx.try_recv() {
                    let pacing = lock_state(&self.state).pacing_interval;
                    debug!("Pacing {:?} before next request", pacing);
                    sleep(pacing).await;
                    next = Some(queued);
                }
            }

            self.busy.store(false, Ordering::Release);
        }
        debug!("Dispatcher queue closed, stopping");
    }

    async fn dispatch(&self, request: QueuedRequest) {
        let QueuedRequest {
            target,
            options,
            reply,
        } = request;

        let started = Instant::now();
        let result = self.fetch_with_retry(&target, &options).await;
        let elapsed = started.elapsed();

        {
            let mut state = lock_state(&self.state);
            match &result {
                Ok(_) => {
                    state.latencies.record(elapsed);
                    state.succeeded += 1;
                }
                Err(e) => {
                    state.failed += 1;
                    warn!(url = %target, "Request failed after retries: {}", e);
                }
            }
        }

        if reply.send(result).is_err() {
            debug!(url = %target, "Submitter dropped before the request completed");
        }
    }

    async fn fetch_with_retry(
        &self,
        target: &str,
        options: &RequestOptions,
    ) -> Result<FetchResponse, DispatchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let error = match self.attempt(target, options).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= max_attempts || !error.is_retryable() {
                return Err(error);
            }

            let delay = backoff_delay(self.config.backoff_base, attempt - 1);
            warn!(
                url = %target,
                attempt,
                max_attempts,
                "Attempt failed: {}, retrying in {:?}",
                error,
                delay
            );
            sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        target: &str,
        options: &RequestOptions,
    ) -> Result<FetchResponse, DispatchError> {
        let limit = self.config.request_timeout;
        // Timing out drops the transport future, which cancels the request.
        let response = match timeout(limit, self.transport.send(target, options)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DispatchError::Timeout {
                    target: target.to_string(),
                    after: limit,
                })
            }
        };

        if !response.is_success() {
            return Err(DispatchError::HttpStatus {
                status: response.status,
                status_text: response.status_text,
            });
        }

        debug!(url = %target, status = response.status, "Attempt succeeded");
        Ok(response)
    }
}
