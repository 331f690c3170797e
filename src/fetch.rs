//! Bounded-concurrency JSON fetch with per-attempt timeout and retry

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::{FETCH_TIMEOUT_MS, MAX_ATTEMPTS, RETRY_DELAY_MS, SLOW_REQUEST_MS};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:99.0) Gecko/20100101 Firefox/99.0";

/// Final outcome of a fetch, after all retries
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx with a parseable JSON body
    Success(Value),
    /// Soft failure (5xx or timeout) that survived every retry
    Unavailable,
    /// Hard failure (4xx, redirect, malformed body); never retried
    Rejected,
}

impl FetchOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            FetchOutcome::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Per-attempt classification driving the retry loop
enum Attempt {
    Done(Value),
    Retry,
    Fail,
}

/// HTTP request executor shared by every instance evaluation.
///
/// A single semaphore caps in-flight requests across the whole crawl;
/// waiters are served in FIFO order. Each attempt carries its own
/// timeout (30s by default) covering connect through body read; timeouts
/// and 5xx responses are retried with a fixed delay, everything else
/// fails the request immediately.
pub struct RetryFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    timeout: Duration,
    retry_delay: Duration,
    max_attempts: u32,
}

impl RetryFetcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Failed to create HTTP client"),
            permits: Arc::new(Semaphore::new(concurrency)),
            timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Overrides the per-attempt timeout (tests shrink it).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the inter-attempt delay (tests zero it out).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub async fn get_json(&self, url: &str) -> FetchOutcome {
        self.execute(Method::GET, url, None).await
    }

    pub async fn post_json(&self, url: &str, body: Option<&Value>) -> FetchOutcome {
        self.execute(Method::POST, url, body).await
    }

    /// Runs the request through the retry loop: attempt, classify,
    /// then retry after a fixed delay or return.
    pub async fn execute(&self, method: Method, url: &str, body: Option<&Value>) -> FetchOutcome {
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                debug!(url, attempt, "retrying request");
                tokio::time::sleep(self.retry_delay).await;
            }

            match self.attempt(method.clone(), url, body).await {
                Attempt::Done(value) => return FetchOutcome::Success(value),
                Attempt::Fail => return FetchOutcome::Rejected,
                Attempt::Retry => {}
            }
        }

        FetchOutcome::Unavailable
    }

    async fn attempt(&self, method: Method, url: &str, body: Option<&Value>) -> Attempt {
        // Held for the duration of the attempt, released before the retry
        // sleep so a stalled instance cannot pin a permit for minutes.
        let _permit = self.permits.acquire().await.ok();

        let mut request = self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                debug!(url, "request timed out");
                return Attempt::Retry;
            }
            Err(e) => {
                debug!(url, error = %e, "request failed");
                return Attempt::Fail;
            }
        };

        let status = response.status();
        if status.is_server_error() {
            debug!(url, status = %status, "server error");
            return Attempt::Retry;
        }
        if !status.is_success() {
            debug!(url, status = %status, "request rejected");
            return Attempt::Fail;
        }

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_REQUEST_MS {
            warn!(url, elapsed_ms = elapsed.as_millis() as u64, "slow response");
        }

        // the per-attempt timeout also covers the body read, so a stalled
        // body is a soft failure like a stalled connect
        match response.json::<Value>().await {
            Ok(value) => Attempt::Done(value),
            Err(e) if e.is_timeout() => {
                debug!(url, "response body timed out");
                Attempt::Retry
            }
            Err(e) => {
                debug!(url, error = %e, "malformed JSON body");
                Attempt::Fail
            }
        }
    }
}
