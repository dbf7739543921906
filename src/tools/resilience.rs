use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::ResilienceConfig;
use crate::error::{Error, Result};

/// Retry schedule. The delay before retry `n` doubles from `initial_delay`
/// and is capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    fn backoff_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let factor = 2u32.saturating_pow(exp);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub failure_ratio: f64,
    pub minimum_throughput: usize,
    pub sampling_duration: Duration,
    pub break_duration: Duration,
}

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed,
    Open { until: Instant },
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    // (recorded_at, failed) outcomes inside the sampling window.
    samples: VecDeque<(Instant, bool)>,
}

/// Rolling-window circuit breaker shared across sessions. Opens once the
/// window holds at least `minimum_throughput` outcomes and the failure ratio
/// reaches `failure_ratio`; a half-open breaker grants a single trial call.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                samples: VecDeque::new(),
            }),
        }
    }

    /// Admission check. The caller that flips an expired `Open` to `HalfOpen`
    /// is the one trial call; everyone else is rejected until it reports back.
    fn acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open { until } => {
                if Instant::now() >= until {
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(Error::CircuitOpen(self.name.clone()))
                }
            }
            BreakerState::HalfOpen => Err(Error::CircuitOpen(self.name.clone())),
        }
    }

    fn record(&self, success: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                if success {
                    tracing::info!("Circuit breaker {} closed after trial call", self.name);
                    inner.state = BreakerState::Closed;
                    inner.samples.clear();
                } else {
                    tracing::warn!("Circuit breaker {} reopened after failed trial", self.name);
                    inner.state = BreakerState::Open {
                        until: now + self.settings.break_duration,
                    };
                }
            }
            // Outcomes reported while open belong to calls admitted earlier;
            // they no longer influence the window.
            BreakerState::Open { .. } => {}
            BreakerState::Closed => {
                inner.samples.push_back((now, !success));
                while let Some((when, _)) = inner.samples.front() {
                    if now.duration_since(*when) > self.settings.sampling_duration {
                        inner.samples.pop_front();
                    } else {
                        break;
                    }
                }

                let total = inner.samples.len();
                if total < self.settings.minimum_throughput {
                    return;
                }
                let failed = inner.samples.iter().filter(|(_, failed)| *failed).count();
                #[allow(clippy::cast_precision_loss)]
                let ratio = failed as f64 / total as f64;
                if ratio >= self.settings.failure_ratio {
                    tracing::warn!(
                        "Circuit breaker {} opened ({failed}/{total} recent calls failed)",
                        self.name
                    );
                    inner.state = BreakerState::Open {
                        until: now + self.settings.break_duration,
                    };
                    inner.samples.clear();
                }
            }
        }
    }
}

/// Stages wrapping every outbound tool call, outermost first: circuit
/// breaker, then retry, then per-attempt timeout. Disabled stages drop out of
/// the chain; with everything disabled this is a bare pass-through.
pub struct ResiliencePipeline {
    breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<RetryPolicy>,
    timeout: Option<Duration>,
}

impl ResiliencePipeline {
    #[must_use]
    pub fn from_config(name: &str, config: &ResilienceConfig) -> Self {
        let breaker = config.circuit_breaker.enabled.then(|| {
            Arc::new(CircuitBreaker::new(
                name,
                BreakerSettings {
                    failure_ratio: config.circuit_breaker.failure_ratio,
                    minimum_throughput: config.circuit_breaker.minimum_throughput,
                    sampling_duration: Duration::from_millis(
                        config.circuit_breaker.sampling_duration_ms,
                    ),
                    break_duration: Duration::from_millis(config.circuit_breaker.break_duration_ms),
                },
            ))
        });
        let retry = config.retry.enabled.then(|| RetryPolicy {
            max_attempts: config.retry.max_attempts,
            initial_delay: Duration::from_millis(config.retry.initial_delay_ms),
            max_delay: Duration::from_millis(config.retry.max_delay_ms),
        });
        let timeout = config
            .timeout
            .enabled
            .then(|| Duration::from_millis(config.timeout.duration_ms));
        Self {
            breaker,
            retry,
            timeout,
        }
    }

    /// Run one logical call through the stages. The breaker sees a single
    /// aggregate outcome per call, not one per retry attempt.
    ///
    /// # Errors
    /// Returns the last attempt's error, `Error::Timeout` if an attempt ran
    /// out of time, or `Error::CircuitOpen` when rejected without calling.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(breaker) = &self.breaker {
            breaker.acquire()?;
            let result = self.run_attempts(&mut attempt).await;
            breaker.record(result.is_ok());
            result
        } else {
            self.run_attempts(&mut attempt).await
        }
    }

    async fn run_attempts<T, F, Fut>(&self, attempt: &mut F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.retry.as_ref().map_or(1, |r| r.max_attempts.max(1));
        let mut tries = 0u32;
        loop {
            tries += 1;
            match self.run_once(attempt()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if tries >= max_attempts || !is_transient(&err) {
                        return Err(err);
                    }
                    let delay = self
                        .retry
                        .as_ref()
                        .map_or(Duration::ZERO, |r| r.backoff_delay(tries));
                    tracing::debug!("Attempt {tries} failed ({err}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_once<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(limit)),
            },
            None => fut.await,
        }
    }
}

/// Transient means worth retrying: network-level faults, timeouts, and 5xx
/// responses. Everything else fails the call immediately.
fn is_transient(err: &Error) -> bool {
    match err {
        Error::Http(err) => {
            err.is_timeout()
                || err.is_connect()
                || err.status().is_some_and(|status| status.is_server_error())
        }
        Error::Timeout(_) => true,
        _ => false,
    }
}
