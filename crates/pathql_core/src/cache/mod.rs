//! Result cache shared by every query created from a compiler.

pub mod chunk;
pub mod key;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use scc::hash_map::Entry;
use tracing::{debug, warn};

pub use self::chunk::{CacheChunk, ChunkState};
pub use self::key::CacheKey;
use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Chains dropped because a table they read was written.
    pub invalidations: u64,
    pub entries: usize,
}

/// Chunk chains keyed by SQL and arguments.
///
/// Stale chains stay in the map until the next lookup or capacity sweep
/// removes them.
#[derive(Debug)]
pub struct QueryCache {
    config: CacheConfig,
    entries: scc::HashMap<CacheKey, Arc<CacheChunk>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        QueryCache {
            config,
            entries: scc::HashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the head of a valid chain for the key.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheChunk>> {
        let now = Instant::now();
        let head = self.entries.read(key, |_, head| head.clone());

        match head {
            Some(head) if head.is_valid(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(head)
            }
            Some(_) => {
                let _ = self.entries.remove_if(key, |head| !head.is_valid(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Publish a freshly filled chain. If a valid chain was published for the
    /// same key in the meantime, that chain is kept and returned instead.
    pub fn publish(&self, key: CacheKey, chain: Arc<CacheChunk>) -> Arc<CacheChunk> {
        let now = Instant::now();

        if self.entries.len() >= self.config.capacity && !self.entries.contains(&key) {
            self.evict_stale(now);
            if self.entries.len() >= self.config.capacity {
                warn!(
                    capacity = self.config.capacity,
                    %key,
                    "query cache full, not caching result"
                );
                return chain;
            }
        }

        match self.entries.entry(key) {
            Entry::Occupied(mut ent) => {
                if ent.get().is_valid(now) {
                    debug!(key = %ent.key(), "lost publish race");
                    ent.get().clone()
                } else {
                    ent.insert(chain.clone());
                    chain
                }
            }
            Entry::Vacant(ent) => {
                ent.insert_entry(chain.clone());
                chain
            }
        }
    }

    /// Invalidate and drop every chain that read from the table. Returns the
    /// number of chains dropped.
    pub fn invalidate_table(&self, table: &str) -> usize {
        let mut dropped = 0;
        self.entries.retain(|_, head| {
            if head.depends_on(table) {
                head.invalidate();
                dropped += 1;
                false
            } else {
                true
            }
        });

        if dropped > 0 {
            self.invalidations.fetch_add(dropped as u64, Ordering::Relaxed);
            debug!(%table, dropped, "invalidated cached results");
        }
        dropped
    }

    fn evict_stale(&self, now: Instant) {
        self.entries.retain(|_, head| head.is_valid(now));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
