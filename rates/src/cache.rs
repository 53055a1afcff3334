//! Rate cache with TTL-gated refetch.
//!
//! Slots never expire on their own: the TTL only decides whether a lookup
//! may skip the providers. A stale slot is still the last resort when every
//! provider fails. Old slots are dropped only by an explicit [`RateCache::prune`].

use agritrace_common::CurrencyPair;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Cached rate for one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSlot {
    pub pair: CurrencyPair,
    pub rate: Decimal,
    pub cached_at: DateTime<Utc>,
}

impl CacheSlot {
    /// Fresh while `now - cached_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.cached_at) < ttl
    }
}

/// Concurrent rate cache keyed by pair, at most one slot per pair.
#[derive(Debug, Default)]
pub struct RateCache {
    slots: DashMap<CurrencyPair, CacheSlot>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the slot for a pair, fresh or not.
    pub fn get(&self, pair: &CurrencyPair) -> Option<CacheSlot> {
        let slot = self.slots.get(pair).map(|s| s.clone());
        if slot.is_none() {
            debug!(pair = %pair, "Cache miss");
        }
        slot
    }

    /// Replace the slot for a pair, returning the previous one.
    pub fn put(&self, pair: CurrencyPair, rate: Decimal, now: DateTime<Utc>) -> Option<CacheSlot> {
        let slot = CacheSlot {
            pair: pair.clone(),
            rate,
            cached_at: now,
        };
        self.slots.insert(pair, slot)
    }

    /// Freshness test used by the engine.
    pub fn is_fresh(slot: &CacheSlot, now: DateTime<Utc>, ttl: Duration) -> bool {
        slot.is_fresh(now, ttl)
    }

    /// Drop slots cached more than `max_age` before `now`. Returns how many went.
    pub fn prune(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now.signed_duration_since(slot.cached_at) <= max_age);
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            debug!(removed, "Pruned old rate cache slots");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self, now: DateTime<Utc>, ttl: Duration) -> CacheStats {
        let total = self.slots.len();
        let fresh = self
            .slots
            .iter()
            .filter(|slot| slot.is_fresh(now, ttl))
            .count();

        CacheStats {
            total_entries: total,
            fresh_entries: fresh,
            stale_entries: total - fresh,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
}

/// Shared rate cache, constructed once per process and handed to the engine.
pub type SharedRateCache = Arc<RateCache>;
