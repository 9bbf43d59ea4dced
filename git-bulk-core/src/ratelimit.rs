//! Client-side rate limiting for remote API calls.
//!
//! One continuous-refill token bucket per endpoint class (core, search, graphql).
//! Each bucket refills at 90% of the documented remote quota so that bursts from
//! several in-flight batches never push the process into server-side throttling.
//! The limiter is meant to be shared process-wide behind an `Arc`.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Cancelled;

/// Fraction of the remote quota the buckets refill at.
pub const QUOTA_SAFETY_FACTOR: f64 = 0.9;

const HOUR: Duration = Duration::from_secs(3600);
const MINUTE: Duration = Duration::from_secs(60);
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Remote API class a call is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Core,
    Search,
    GraphQl,
}

/// Documented remote quotas and the burst each bucket starts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiLimits {
    pub core_requests_per_hour: u32,
    pub search_requests_per_minute: u32,
    pub graphql_points_per_hour: u32,
    pub core_burst: u32,
    pub search_burst: u32,
    pub graphql_burst: u32,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            core_requests_per_hour: 5000,
            search_requests_per_minute: 30,
            graphql_points_per_hour: 5000,
            core_burst: 10,
            search_burst: 5,
            graphql_burst: 10,
        }
    }
}

/// Cumulative counters since construction or the last reset.
///
/// The `*_waits` fields count successful [`RateLimiter::acquire`] calls per
/// class, including ones that found a token immediately. Time actually spent
/// blocked is in `total_wait_ms`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    pub core_waits: u64,
    pub search_waits: u64,
    pub graphql_waits: u64,
    pub total_wait_ms: u64,
}

struct BucketState {
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

struct TokenBucket {
    /// Tokens per second.
    rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Zero quotas and bursts are raised to 1; a bucket that can never hold a
    /// whole token would park every `acquire` forever.
    fn new(quota: u32, window: Duration, burst: u32) -> Self {
        let rate = f64::from(quota.max(1)) * QUOTA_SAFETY_FACTOR / window.as_secs_f64();
        let burst = f64::from(burst.max(1));
        Self {
            rate,
            state: Mutex::new(BucketState {
                capacity: burst,
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate).min(state.capacity);
        state.last_refill = now;
    }

    /// Takes a token, or reports how long until one accrues.
    fn take_or_wait(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - state.tokens;
        let wait = Duration::try_from_secs_f64(missing / self.rate).unwrap_or(HOUR);
        Err(wait.max(MIN_WAIT))
    }

    fn set_capacity(&self, burst: u32) {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.capacity = f64::from(burst.max(1));
        state.tokens = state.tokens.min(state.capacity);
    }
}

/// Per-class token-bucket gate in front of every remote call.
pub struct RateLimiter {
    core: TokenBucket,
    search: TokenBucket,
    graphql: TokenBucket,
    stats: Mutex<RateLimitStats>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&ApiLimits::default())
    }
}

impl RateLimiter {
    pub fn new(limits: &ApiLimits) -> Self {
        debug!(?limits, "Constructing rate limiter");
        Self {
            core: TokenBucket::new(limits.core_requests_per_hour, HOUR, limits.core_burst),
            search: TokenBucket::new(limits.search_requests_per_minute, MINUTE, limits.search_burst),
            graphql: TokenBucket::new(limits.graphql_points_per_hour, HOUR, limits.graphql_burst),
            stats: Mutex::new(RateLimitStats::default()),
        }
    }

    fn bucket(&self, class: EndpointClass) -> &TokenBucket {
        match class {
            EndpointClass::Core => &self.core,
            EndpointClass::Search => &self.search,
            EndpointClass::GraphQl => &self.graphql,
        }
    }

    /// Consumes a token if one is available right now. Never waits.
    pub fn try_acquire(&self, class: EndpointClass) -> bool {
        self.bucket(class).take_or_wait().is_ok()
    }

    /// Waits for a token of `class`, or until `cancel` fires.
    ///
    /// An already-fired signal wins even when a token is available. Only
    /// successful acquisitions are counted in [`RateLimitStats`].
    pub async fn acquire(
        &self,
        class: EndpointClass,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let start = Instant::now();
        let bucket = self.bucket(class);
        loop {
            match bucket.take_or_wait() {
                Ok(()) => break,
                Err(wait) => {
                    debug!(?class, wait_ms = wait.as_millis() as u64, "Rate limited, waiting for token");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        let waited_ms = start.elapsed().as_millis() as u64;
        let mut stats = self.stats.lock();
        match class {
            EndpointClass::Core => stats.core_waits += 1,
            EndpointClass::Search => stats.search_waits += 1,
            EndpointClass::GraphQl => stats.graphql_waits += 1,
        }
        stats.total_wait_ms += waited_ms;
        Ok(())
    }

    pub fn stats(&self) -> RateLimitStats {
        *self.stats.lock()
    }

    /// Zeroes the counters. Bucket levels are left alone.
    pub fn reset_stats(&self) {
        *self.stats.lock() = RateLimitStats::default();
    }

    /// Changes bucket capacities; current tokens are clamped to the new burst.
    /// A burst of 0 is raised to 1.
    pub fn set_burst(&self, core: u32, search: u32, graphql: u32) {
        self.core.set_capacity(core);
        self.search.set_capacity(search);
        self.graphql.set_capacity(graphql);
    }
}
