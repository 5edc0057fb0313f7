//! Fixed-window rate limiting.
//!
//! Implements an owned fixed-window counter behind a `try_acquire` interface
//! so the windowing algorithm is specified here, not inherited from an
//! opaque dependency. A key's window starts at its first observed request
//! and rolls over every `window` duration; the count increments only on
//! allowed decisions, and a denial reports the time until the boundary.
//!
//! # Thread safety
//!
//! Limiter instances are shared by every concurrent request. The bucket map
//! takes a read lock on the hot path and a write lock only when a key is
//! first seen; each bucket has its own mutex, so increment-and-compare is
//! atomic per key without serialising distinct keys against each other.
//! The write-lock path also sweeps buckets whose windows have expired, so
//! the map stays bounded by the set of keys active within one window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Which of the two limiter partitions produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterScope {
    /// Keyed by the target resource (the remote base).
    Resource,
    /// Keyed by the caller's credential.
    Credential,
}

impl std::fmt::Display for LimiterScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource => write!(f, "resource"),
            Self::Credential => write!(f, "credential"),
        }
    }
}

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Capacity was consumed; the request may proceed.
    Allowed,
    /// The key's window is exhausted.
    Denied {
        /// Time until the window boundary, for `Retry-After`-style replies.
        retry_after: Duration,
    },
}

impl Decision {
    /// Returns `true` for [`Decision::Allowed`].
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

// ---------------------------------------------------------------------------
// Fixed-window limiter
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// A fixed-window counter over string keys.
///
/// Two named instances exist per pipeline: the resource partition and the
/// credential partition. Construction is explicit and injected — there are
/// no process-wide limiter singletons.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    scope: LimiterScope,
    limit: u32,
    window: Duration,
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
}

impl FixedWindowLimiter {
    /// Creates a limiter admitting `limit` requests per `window` per key.
    ///
    /// `limit` and `window` must be non-zero; configuration loading enforces
    /// this before construction.
    pub fn new(scope: LimiterScope, limit: u32, window: Duration) -> Self {
        debug_assert!(limit > 0 && !window.is_zero());
        Self {
            scope,
            limit,
            window,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Returns which partition this limiter serves.
    pub fn scope(&self) -> LimiterScope {
        self.scope
    }

    /// Attempts to consume one unit of capacity for `key` now.
    pub fn try_acquire(&self, key: &str) -> Decision {
        self.try_acquire_at(key, Instant::now())
    }

    /// Attempts to consume one unit of capacity for `key` at `now`.
    ///
    /// Exposed so window-rollover behaviour is testable without sleeping.
    pub fn try_acquire_at(&self, key: &str, now: Instant) -> Decision {
        let bucket = self.bucket(key, now);
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= self.limit {
            let remaining = self.window - now.saturating_duration_since(bucket.window_start);
            tracing::warn!(
                scope = %self.scope,
                limit = self.limit,
                retry_after_ms = remaining.as_millis() as u64,
                "rate limit window exhausted"
            );
            return Decision::Denied {
                retry_after: remaining,
            };
        }

        bucket.count += 1;
        Decision::Allowed
    }

    /// Returns `key`'s admitted count within its current window, as of now.
    ///
    /// Zero for unseen keys and for keys whose window has rolled over.
    /// Used for diagnostics and quota-consumption assertions.
    pub fn current_count(&self, key: &str) -> u32 {
        self.count_at(key, Instant::now())
    }

    /// Returns `key`'s admitted count within the window containing `now`.
    pub fn count_at(&self, key: &str, now: Instant) -> u32 {
        let buckets = self
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(bucket) = buckets.get(key) else {
            return 0;
        };
        let bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        if now.saturating_duration_since(bucket.window_start) >= self.window {
            0
        } else {
            bucket.count
        }
    }

    /// Returns the number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<Mutex<Bucket>> {
        {
            let buckets = self
                .buckets
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(bucket) = buckets.get(key) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // First sight of a key is the slow path anyway; sweep buckets whose
        // windows have expired so the map never accumulates dead keys.
        buckets.retain(|_, bucket| {
            let bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            now.saturating_duration_since(bucket.window_start) < self.window
        });

        Arc::clone(buckets.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(Bucket {
                window_start: now,
                count: 0,
            }))
        }))
    }
}
