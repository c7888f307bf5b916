//! In-memory freshness cache for computed goals
//!
//! Holds at most one entry per user. An entry is served only when the caller's
//! fingerprint equals the one it was stored under; a mismatch is a miss and the
//! caller recomputes. There is no TTL and no eviction beyond last-write-wins.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

use crate::fingerprint::ProfileFingerprint;
use crate::models::DailyGoals;

/// Cache entry for a single user
#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: ProfileFingerprint,
    goals: DailyGoals,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Misses where an entry existed under a different fingerprint
    pub stale_misses: u64,
    pub invalidations: u64,
}

impl CacheMetrics {
    /// Get hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            return 0.0;
        }
        (self.cache_hits as f64 / self.total_lookups as f64) * 100.0
    }
}

/// Per-user cache of the last computed goals, keyed by profile fingerprint
#[derive(Debug, Default)]
pub struct FreshnessCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    metrics: Mutex<CacheMetrics>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Goals for `user_id` if they were computed from `fingerprint`
    pub fn get(&self, user_id: &str, fingerprint: &ProfileFingerprint) -> Option<DailyGoals> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        metrics.total_lookups += 1;

        match entries.get(user_id) {
            Some(entry) if entry.fingerprint == *fingerprint => {
                debug!(user_id, fingerprint = fingerprint.short(), "Freshness cache hit");
                metrics.cache_hits += 1;
                Some(entry.goals.with_freshness(true))
            }
            Some(entry) => {
                debug!(
                    user_id,
                    cached = entry.fingerprint.short(),
                    current = fingerprint.short(),
                    "Fingerprint mismatch - profile has changed"
                );
                metrics.cache_misses += 1;
                metrics.stale_misses += 1;
                None
            }
            None => {
                debug!(user_id, "Freshness cache miss");
                metrics.cache_misses += 1;
                None
            }
        }
    }

    /// Store goals for a user, replacing any previous entry
    pub fn put(&self, user_id: &str, fingerprint: ProfileFingerprint, goals: DailyGoals) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(user_id.to_string(), CacheEntry { fingerprint, goals });
    }

    /// Drop the entry for a user; returns whether one existed
    pub fn invalidate(&self, user_id: &str) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
            .is_some();

        if removed {
            let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
            metrics.invalidations += 1;
            debug!(user_id, "Freshness cache entry invalidated");
        }
        removed
    }

    /// Fingerprint the user's entry was stored under, without counting a lookup
    pub fn fingerprint_for(&self, user_id: &str) -> Option<ProfileFingerprint> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(|entry| entry.fingerprint.clone())
    }

    /// Cached goals regardless of freshness, marked stale on mismatch
    pub fn peek(&self, user_id: &str, fingerprint: &ProfileFingerprint) -> Option<DailyGoals> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(|entry| entry.goals.with_freshness(entry.fingerprint == *fingerprint))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear entire cache
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
        debug!("Freshness cache cleared");
    }

    /// Get cache metrics
    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
