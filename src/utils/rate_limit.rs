//! Per-provider token-bucket rate limiting.
//!
//! A single [`RateLimiter`] is constructed when the pipeline is assembled and
//! shared (as `Arc<RateLimiter>`) by every adapter. Each provider owns its own
//! bucket behind its own async mutex, so callers targeting one provider are
//! serialized while callers targeting different providers never contend.
//!
//! Refill is computed lazily at acquire time; there is no background task.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::models::Provider;

/// Rate used for providers that were never configured
pub const DEFAULT_RATE: f64 = 1.0;

/// Slowest accepted rate: one request every ~17 minutes
const MIN_RATE: f64 = 1e-3;

/// Token bucket state for one provider
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket with a burst capacity of two seconds' worth of requests
    pub fn new(refill_rate: f64) -> Self {
        Self::with_capacity(refill_rate, refill_rate * 2.0)
    }

    pub fn with_capacity(refill_rate: f64, capacity: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Tokens as of the last refill
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, sleeping until it is available. Returns the time waited.
    pub async fn acquire(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Duration::ZERO;
        }

        let wait = Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate);
        tokio::time::sleep(wait).await;
        self.tokens = 0.0;
        self.last_refill = Instant::now();
        wait
    }
}

#[derive(Debug, Clone)]
struct BucketSlot {
    rate: f64,
    bucket: Arc<Mutex<TokenBucket>>,
}

impl BucketSlot {
    fn new(rate: f64) -> Self {
        Self {
            rate,
            bucket: Arc::new(Mutex::new(TokenBucket::new(rate))),
        }
    }
}

/// Shared per-provider rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, BucketSlot>>,
    default_rate: f64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            default_rate: DEFAULT_RATE,
        }
    }
}

impl RateLimiter {
    /// Create a limiter with no configured providers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a limiter with one bucket per `(provider, requests_per_second)` pair
    pub fn with_rates<I, S>(rates: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let limiter = Self::new();
        limiter.insert_rates(rates);
        limiter
    }

    /// Set the rate given to providers that have no configured bucket
    pub fn with_default_rate(mut self, rate: f64) -> Self {
        if is_valid_rate(rate) {
            self.default_rate = rate;
        } else {
            tracing::warn!(rate, "Invalid default rate limit, keeping {}", DEFAULT_RATE);
        }
        self
    }

    /// Create a limiter from the `[rate_limits]` configuration section
    ///
    /// Every known provider gets a bucket up front; anything else falls back
    /// to `default_requests_per_second` when first used.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let limiter = Self::new().with_default_rate(config.default_requests_per_second);
        limiter.insert_rates(
            Provider::ALL
                .iter()
                .map(|provider| (provider.id(), config.rate_for(*provider))),
        );
        limiter
    }

    fn insert_rates<I, S>(&self, rates: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut slots = self.write_slots();
        for (provider, rate) in rates {
            let provider = provider.into();
            let rate = if is_valid_rate(rate) {
                rate
            } else {
                tracing::warn!(%provider, rate, "Invalid rate limit, using default");
                self.default_rate
            };
            slots.insert(provider, BucketSlot::new(rate));
        }
    }

    fn read_slots(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, BucketSlot>> {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, BucketSlot>> {
        self.buckets.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bucket(&self, provider: &str) -> Arc<Mutex<TokenBucket>> {
        if let Some(slot) = self.read_slots().get(provider) {
            return Arc::clone(&slot.bucket);
        }

        let default_rate = self.default_rate;
        let mut slots = self.write_slots();
        let slot = slots.entry(provider.to_string()).or_insert_with(|| {
            tracing::debug!(provider, rate = default_rate, "Creating default rate-limit bucket");
            BucketSlot::new(default_rate)
        });
        Arc::clone(&slot.bucket)
    }

    /// Wait for and consume one request permit for `provider`.
    ///
    /// Returns how long the caller was suspended.
    pub async fn acquire(&self, provider: impl AsRef<str>) -> Duration {
        let provider = provider.as_ref();
        let bucket = self.bucket(provider);
        let mut bucket = bucket.lock().await;
        let waited = bucket.acquire().await;
        if !waited.is_zero() {
            tracing::debug!(provider, waited_ms = waited.as_millis() as u64, "Rate limited");
        }
        waited
    }

    /// Replace a provider's bucket with a fresh one at `rate` requests per second
    pub fn update_rate(&self, provider: impl AsRef<str>, rate: f64) {
        let provider = provider.as_ref();
        if !is_valid_rate(rate) {
            tracing::warn!(provider, rate, "Ignoring invalid rate limit update");
            return;
        }
        tracing::info!(provider, rate, "Updating rate limit");
        self.write_slots()
            .insert(provider.to_string(), BucketSlot::new(rate));
    }

    /// Configured rate for a provider, if it has a bucket yet
    pub fn rate(&self, provider: impl AsRef<str>) -> Option<f64> {
        self.read_slots().get(provider.as_ref()).map(|slot| slot.rate)
    }

    /// Apply a rate the provider advertised in its response headers.
    ///
    /// Only a change of rate replaces the bucket, so repeated identical
    /// headers do not refill it.
    pub fn observe_advertised_rate(&self, provider: impl AsRef<str>, advertised: Option<f64>) {
        let Some(rate) = advertised else {
            return;
        };
        let provider = provider.as_ref();
        let current = self.rate(provider);
        if current.map_or(true, |r| (r - rate).abs() > f64::EPSILON) {
            self.update_rate(provider, rate);
        }
    }
}

fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate >= MIN_RATE
}
