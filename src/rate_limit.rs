// ABOUTME: Fixed-window rate limiting for brute-force-prone endpoints
// ABOUTME: Counter storage is an injected capability; the limiter always fails open
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Rate Limiter.
//!
//! Fixed-window semantics: the counter for a `(endpoint, identity)` bucket
//! resets every `window_seconds`, and a request is allowed iff the
//! pre-increment count is below `permitted_requests`. Counters are
//! ephemeral; losing them on restart is acceptable. The limiter never fails
//! closed: a broken limiter must not become its own denial of service.

use crate::identity::Clock;
use crate::models::RateLimitConfig;
use crate::storage::AuthStore;
use dashmap::DashMap;
use std::sync::Arc;

/// Atomic increment-and-read capability for counter buckets.
///
/// Single-process deployments use [`InMemoryCounterStore`]; multi-instance
/// deployments implement this over a shared counter store. The limiter
/// contract is identical either way.
pub trait CounterStore: Send + Sync {
    /// Atomically increment the bucket's counter for `window_index` and
    /// return the post-increment count. A bucket presented with a newer
    /// window index restarts from one; the stale window's count is dropped.
    fn increment(&self, bucket: &str, window_index: i64) -> u64;
}

/// Process-local counters on a concurrent map. One entry per
/// `(endpoint, identity)` bucket; rolled-over windows reuse the entry
/// instead of accreting a new one per window.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, (i64, u64)>,
}

impl InMemoryCounterStore {
    /// Create an empty counter store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, bucket: &str, window_index: i64) -> u64 {
        let mut entry = self
            .counters
            .entry(bucket.to_owned())
            .or_insert((window_index, 0));
        if entry.0 != window_index {
            *entry = (window_index, 0);
        }
        entry.1 += 1;
        entry.1
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Seconds until the current window resets; meaningful when denied
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    const ALLOW: Self = Self {
        allowed: true,
        retry_after_secs: 0,
    };
}

/// Guards brute-force-prone endpoints with configurable fixed windows
pub struct RateLimiter {
    store: Arc<dyn AuthStore>,
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter over the shared store and an injected counter store.
    #[must_use]
    pub fn new(
        store: Arc<dyn AuthStore>,
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            counters,
            clock,
        }
    }

    /// Check whether a request from `client_identity` may hit `endpoint_key`.
    ///
    /// Missing or disabled configs always allow. Config lookup failures
    /// allow too, with a warning: fail open, never closed.
    pub async fn check(&self, endpoint_key: &str, client_identity: &str) -> RateLimitDecision {
        let config = match self.store.get_rate_limit_config(endpoint_key).await {
            Ok(Some(config)) => config,
            Ok(None) => return RateLimitDecision::ALLOW,
            Err(e) => {
                tracing::warn!(endpoint_key, "rate limit config lookup failed, allowing: {e:#}");
                return RateLimitDecision::ALLOW;
            }
        };

        if !config.is_enabled || config.window_seconds == 0 {
            return RateLimitDecision::ALLOW;
        }

        self.check_window(&config, client_identity)
    }

    fn check_window(&self, config: &RateLimitConfig, client_identity: &str) -> RateLimitDecision {
        let now = self.clock.now().timestamp();
        let window = i64::from(config.window_seconds);
        let window_index = now.div_euclid(window);

        let bucket = format!("{}:{}", config.endpoint_key, client_identity);
        let count = self.counters.increment(&bucket, window_index);

        if count <= u64::from(config.permitted_requests) {
            RateLimitDecision::ALLOW
        } else {
            let window_end = (window_index + 1) * window;
            let retry_after_secs = u64::try_from(window_end - now).unwrap_or(0);
            tracing::warn!(
                endpoint_key = %config.endpoint_key,
                client_identity,
                count,
                limit = config.permitted_requests,
                "rate limit exceeded"
            );
            RateLimitDecision {
                allowed: false,
                retry_after_secs,
            }
        }
    }
}
