//! Rate-limited, retrying, run-scoped-cached fetch layer.
//!
//! One [`RateLimitedFetcher`] exists per run. Every upstream request from
//! every concurrent branch passes through its token bucket, so the
//! configured ceiling holds globally, not per task. Successful responses
//! are memoized by [`ResourceKey`] for the remainder of the run, and
//! concurrent requests for the same key share a single upstream fetch.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, warn};

use pitwall_core::config::IngestConfig;

use crate::error::FetchError;

/// Logical identity of an upstream resource. The cache is keyed on this,
/// not on the URL, so the two source providers share cache semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Meetings { year: i32 },
    Sessions { meeting_key: i32 },
    Drivers { session_key: i32 },
    Stints { session_key: i32 },
    Laps { session_key: i32, driver_number: i32 },
    PitStops { session_key: i32 },
    Results { session_key: i32 },
    Grid { session_key: i32 },
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Meetings { year } => write!(f, "meetings/{year}"),
            ResourceKey::Sessions { meeting_key } => write!(f, "sessions/{meeting_key}"),
            ResourceKey::Drivers { session_key } => write!(f, "drivers/{session_key}"),
            ResourceKey::Stints { session_key } => write!(f, "stints/{session_key}"),
            ResourceKey::Laps {
                session_key,
                driver_number,
            } => write!(f, "laps/{session_key}/{driver_number}"),
            ResourceKey::PitStops { session_key } => write!(f, "pit_stops/{session_key}"),
            ResourceKey::Results { session_key } => write!(f, "results/{session_key}"),
            ResourceKey::Grid { session_key } => write!(f, "grid/{session_key}"),
        }
    }
}

/// Transport seam. Production uses [`HttpSource`]; tests substitute a fake.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch one resource and return its rows. Sources speak JSON arrays.
    async fn fetch_rows(&self, url: &str) -> Result<Vec<Value>, FetchError>;
}

pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch_rows(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body: Value = response.json().await?;
        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(FetchError::Malformed {
                url: url.to_string(),
                detail: format!("expected a JSON array, got {}", json_kind(&other)),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    rps: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rps: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            tokens: capacity,
            capacity,
            rps: rps.max(0.001),
            last_refill: Instant::now(),
        }
    }

    /// Take one token if available, otherwise report how long until the
    /// next one accrues.
    fn try_acquire(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rps).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.rps))
        }
    }
}

type CachedRows = Arc<Vec<Value>>;

pub struct RateLimitedFetcher {
    source: Arc<dyn RemoteSource>,
    bucket: Mutex<TokenBucket>,
    cache: Mutex<HashMap<ResourceKey, Arc<OnceCell<CachedRows>>>>,
    max_attempts: u32,
    backoff_base_secs: f64,
    jitter_max_secs: f64,
}

impl RateLimitedFetcher {
    pub fn new(source: Arc<dyn RemoteSource>, config: &IngestConfig) -> Self {
        Self {
            source,
            bucket: Mutex::new(TokenBucket::new(
                config.rate_limit_rps,
                config.rate_limit_burst,
            )),
            cache: Mutex::new(HashMap::new()),
            max_attempts: config.max_attempts.max(1),
            backoff_base_secs: config.backoff_base_secs,
            jitter_max_secs: config.jitter_max_secs,
        }
    }

    /// Fetch the rows for `key`, going upstream at most once per key per
    /// run. Errors are not memoized, so a later branch may retry a key
    /// that previously failed.
    pub async fn fetch(&self, key: &ResourceKey, url: &str) -> Result<CachedRows, FetchError> {
        let cell = {
            let mut cache = self.cache.lock().unwrap();
            cache.entry(key.clone()).or_default().clone()
        };
        cell.get_or_try_init(|| self.fetch_with_retry(key, url))
            .await
            .cloned()
    }

    async fn fetch_with_retry(
        &self,
        key: &ResourceKey,
        url: &str,
    ) -> Result<CachedRows, FetchError> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            self.acquire_token().await;
            match self.source.fetch_rows(url).await {
                Ok(rows) => {
                    debug!(%key, attempt, rows = rows.len(), "fetched");
                    return Ok(Arc::new(rows));
                }
                Err(err) if !err.retryable() => return Err(err),
                Err(err) => {
                    last_error = err.to_string();
                    if attempt < self.max_attempts {
                        let delay = self.backoff_delay();
                        warn!(
                            %key,
                            attempt,
                            error = %err,
                            delay_secs = delay.as_secs_f64(),
                            "transient fetch failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(FetchError::RetriesExhausted {
            key: key.to_string(),
            attempts: self.max_attempts,
            last: last_error,
        })
    }

    async fn acquire_token(&self) {
        loop {
            let wait = self.bucket.lock().unwrap().try_acquire();
            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    fn backoff_delay(&self) -> Duration {
        let jitter = if self.jitter_max_secs > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter_max_secs)
        } else {
            0.0
        };
        Duration::from_secs_f64(self.backoff_base_secs + jitter)
    }
}
