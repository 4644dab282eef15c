//! Client-side throttling for SharePoint REST calls
//!
//! SharePoint Online throttles per user and per tenant and answers 429 or
//! 503 with a `Retry-After` header once a client pushes too hard. Requests
//! are grouped into categories (`read`, `write`, `batch`, `upload`), each
//! with its own token bucket. A throttled answer halves the category's
//! capacity; sustained success grows it back.
//!
//! ```rust,no_run
//! use sharekit_rest::rate_limit::{AdaptiveRateLimiter, RateLimitConfig};
//!
//! # async fn example() {
//! let limiter = AdaptiveRateLimiter::new(RateLimitConfig::default());
//! let _permit = limiter.acquire("read").await;
//! limiter.on_success("read");
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sharekit_core::config::RateLimitingConfig;
use tracing::{debug, info, warn};

/// Category for plain reads
pub const READ: &str = "read";
/// Category for single mutations
pub const WRITE: &str = "write";
/// Category for `$batch` posts
pub const BATCH: &str = "batch";
/// Category for binary uploads
pub const UPLOAD: &str = "upload";

/// Consecutive successes needed before capacity grows again
const RECOVERY_INTERVAL: u64 = 50;

/// Upper bound for an HTTP-date `Retry-After`
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// TokenBucket
// ============================================================================

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    /// Capacity after throttle adjustments
    limit: u32,
    successes: u64,
}

/// Token bucket for one request category
///
/// Starts full; refills continuously at `refill_rate` tokens per second up
/// to the current limit.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
                limit: capacity,
                successes: 0,
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_rate).min(f64::from(state.limit));
            state.last_refill = now;
        }
    }

    /// Takes a token if one is available
    pub fn try_acquire(&self) -> bool {
        let mut state = lock(&self.state);
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token becomes available
    pub fn wait_time(&self) -> Duration {
        let mut state = lock(&self.state);
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            Duration::ZERO
        } else if self.refill_rate > 0.0 {
            Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
        } else {
            Duration::MAX
        }
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = lock(&self.state);
        self.refill(&mut state);
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Capacity after throttle adjustments
    pub fn limit(&self) -> u32 {
        lock(&self.state).limit
    }

    /// Grows the limit by 10% every [`RECOVERY_INTERVAL`] successes
    pub fn on_success(&self) {
        let mut state = lock(&self.state);
        state.successes += 1;
        if state.successes % RECOVERY_INTERVAL == 0 && state.limit < self.capacity {
            let grown = (state.limit + (state.limit / 10).max(1)).min(self.capacity);
            debug!(from = state.limit, to = grown, "Recovering bucket capacity");
            state.limit = grown;
        }
    }

    /// Halves the limit (never below one) and drains the bucket to it
    pub fn on_throttle(&self) {
        let mut state = lock(&self.state);
        let previous = state.limit;
        state.limit = (state.limit / 2).max(1);
        state.tokens = state.tokens.min(f64::from(state.limit));
        state.successes = 0;
        warn!(from = previous, to = state.limit, "Throttled, halving bucket capacity");
    }
}

// ============================================================================
// RateLimitConfig
// ============================================================================

/// Bucket parameters and retry policy
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default_capacity: u32,
    /// Tokens per second
    pub default_refill_rate: f64,
    /// Per-category `(capacity, refill_rate)`
    pub category_overrides: HashMap<String, (u32, f64)>,
    /// Retries after a 429/503 before giving up
    pub max_retries: u32,
    /// Delay used when the server sends no usable `Retry-After`
    pub default_retry_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&RateLimitingConfig::default())
    }
}

impl From<&RateLimitingConfig> for RateLimitConfig {
    fn from(config: &RateLimitingConfig) -> Self {
        let mut overrides = HashMap::new();
        // Uploads are large and rare; batches count as many requests server-side
        overrides.insert(UPLOAD.to_string(), (10, 0.5));
        overrides.insert(
            BATCH.to_string(),
            ((config.capacity / 10).max(1), (config.refill_per_second / 10.0).max(0.1)),
        );
        Self {
            default_capacity: config.capacity,
            default_refill_rate: config.refill_per_second,
            category_overrides: overrides,
            max_retries: config.max_retries,
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
        }
    }
}

// ============================================================================
// AdaptiveRateLimiter
// ============================================================================

/// Marker returned once a token was taken
#[derive(Debug)]
pub struct Permit {
    category: String,
}

impl Permit {
    pub fn category(&self) -> &str {
        &self.category
    }
}

/// Token buckets per category, created on first use
///
/// Shared through `Arc` by every request of a transport.
pub struct AdaptiveRateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub fn default_retry_after(&self) -> Duration {
        self.config.default_retry_after
    }

    fn with_bucket<R>(&self, category: &str, f: impl FnOnce(&TokenBucket) -> R) -> R {
        let mut buckets = lock(&self.buckets);
        let bucket = buckets.entry(category.to_string()).or_insert_with(|| {
            let (capacity, rate) = self
                .config
                .category_overrides
                .get(category)
                .copied()
                .unwrap_or((self.config.default_capacity, self.config.default_refill_rate));
            debug!(category, capacity, rate, "Creating token bucket");
            TokenBucket::new(capacity, rate)
        });
        f(bucket)
    }

    /// Waits until a token for `category` is available and takes it
    pub async fn acquire(&self, category: &str) -> Permit {
        loop {
            if self.with_bucket(category, TokenBucket::try_acquire) {
                return Permit {
                    category: category.to_string(),
                };
            }
            let wait = self
                .with_bucket(category, TokenBucket::wait_time)
                .max(Duration::from_millis(10));
            debug!(category, wait_ms = wait.as_millis(), "Waiting for rate limit token");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn on_success(&self, category: &str) {
        self.with_bucket(category, TokenBucket::on_success);
    }

    pub fn on_throttle(&self, category: &str) {
        info!(category, "Recording throttle");
        self.with_bucket(category, TokenBucket::on_throttle);
    }

    /// Current limit of a category, `None` before its first use
    pub fn limit(&self, category: &str) -> Option<u32> {
        lock(&self.buckets).get(category).map(TokenBucket::limit)
    }
}

// ============================================================================
// Retry-After
// ============================================================================

/// Parses a `Retry-After` value: delta seconds or an HTTP date
///
/// Falls back to `default` for unparseable values, dates in the past and
/// dates too far ahead.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }
    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delay = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(delay) = delay.to_std() {
            if delay <= MAX_RETRY_AFTER {
                return delay;
            }
        }
    }
    warn!(value, "Unusable Retry-After header, using default");
    default
}
