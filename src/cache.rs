// Correlation cache: the only place an offer lives between search and booking

use crate::error::CacheError;
use crate::model::Offer;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Short-lived offer id -> offer store.
///
/// A miss (`Ok(None)`) is a normal outcome: the id is unknown or its window has
/// passed, and the caller must search again. `Err` means the store itself failed.
#[async_trait]
pub trait OfferStore: Send + Sync + 'static {
    async fn put(&self, offer_id: &str, offer: &Offer) -> Result<(), CacheError>;

    async fn get(&self, offer_id: &str) -> Result<Option<Offer>, CacheError>;

    async fn invalidate(&self, offer_id: &str) -> Result<bool, CacheError>;
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub writes: AtomicUsize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub rejected_count: AtomicUsize,
    pub invalidated_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub writes: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub expired_count: usize,
    pub rejected_count: usize,
    pub invalidated_count: usize,
}

struct CacheEntry {
    offer: Offer,
    // Fixed at write time, reads never extend it
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct CorrelationCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    stats: CacheStats,
}

impl CorrelationCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&self, offer_id: &str, offer: &Offer) -> Result<(), CacheError> {
        let now = Instant::now();

        if !self.entries.contains_key(offer_id) && self.entries.len() >= self.max_entries {
            let purged = self.purge_expired();
            if purged == 0 && self.entries.len() >= self.max_entries {
                self.stats.rejected_count.fetch_add(1, Ordering::SeqCst);
                return Err(CacheError::CapacityExceeded {
                    capacity: self.max_entries,
                });
            }
        }

        self.entries.insert(
            offer_id.to_string(),
            CacheEntry {
                offer: offer.clone(),
                expires_at: now + self.ttl,
            },
        );
        self.stats.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn lookup(&self, offer_id: &str) -> Option<Offer> {
        let now = Instant::now();

        // The shard read guard must be gone before remove_if takes the write lock
        let (hit, expired) = match self.entries.get(offer_id) {
            Some(entry) if !entry.is_expired(now) => (Some(entry.offer.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };

        // Only drop it if no fresh write replaced it in the meantime
        if expired
            && self
                .entries
                .remove_if(offer_id, |_, entry| entry.is_expired(now))
                .is_some()
        {
            self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
        }

        match hit {
            Some(offer) => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                Some(offer)
            }
            None => {
                self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    pub fn remove(&self, offer_id: &str) -> bool {
        let removed = self.entries.remove(offer_id).is_some();
        if removed {
            self.stats.invalidated_count.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            self.stats.expired_count.fetch_add(purged, Ordering::SeqCst);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.entries.len(),
            writes: self.stats.writes.load(Ordering::SeqCst),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
            rejected_count: self.stats.rejected_count.load(Ordering::SeqCst),
            invalidated_count: self.stats.invalidated_count.load(Ordering::SeqCst),
        }
    }

    // Periodically purges expired entries. Stops once the cache is dropped.
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Correlation cache dropped, janitor exiting");
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    info!(purged, remaining = cache.len(), "Purged expired offers");
                }
            }
        })
    }
}

#[async_trait]
impl OfferStore for CorrelationCache {
    async fn put(&self, offer_id: &str, offer: &Offer) -> Result<(), CacheError> {
        self.insert(offer_id, offer).map_err(|err| {
            warn!(offer_id, error = %err, "Offer not cached");
            err
        })
    }

    async fn get(&self, offer_id: &str) -> Result<Option<Offer>, CacheError> {
        Ok(self.lookup(offer_id))
    }

    async fn invalidate(&self, offer_id: &str) -> Result<bool, CacheError> {
        Ok(self.remove(offer_id))
    }
}
