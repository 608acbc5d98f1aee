use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use crate::execution::CachedValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkState {
    Fresh = 0,
    /// The cache timeout elapsed.
    Expired = 1,
    /// A table read by the query was written.
    Invalidated = 2,
}

impl ChunkState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Fresh,
            1 => Self::Expired,
            _ => Self::Invalidated,
        }
    }
}

/// A block of cached rows. Chunks form a chain through `next`, and the whole
/// chain shares its expiry and table set.
///
/// A chunk only ever leaves the fresh state. Stale chains are replaced, never
/// refilled.
#[derive(Debug)]
pub struct CacheChunk {
    rows: Vec<Vec<CachedValue>>,
    state: AtomicU8,
    expires_at: Instant,
    tables: Arc<[String]>,
    /// The chain holds every row of the result.
    complete: bool,
    next: Option<Arc<CacheChunk>>,
}

impl CacheChunk {
    /// Split rows into a chain of chunks holding at most `chunk_size` rows
    /// each. An empty result produces a single empty chunk.
    pub fn build_chain(
        rows: Vec<Vec<CachedValue>>,
        chunk_size: usize,
        expires_at: Instant,
        tables: &[String],
        complete: bool,
    ) -> Arc<CacheChunk> {
        let tables: Arc<[String]> = tables.into();
        let chunk_size = chunk_size.max(1);

        let mut blocks = Vec::new();
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            blocks.push(rows.by_ref().take(chunk_size).collect::<Vec<_>>());
        }
        if blocks.is_empty() {
            blocks.push(Vec::new());
        }

        let mut next = None;
        for block in blocks.into_iter().rev() {
            next = Some(Arc::new(CacheChunk {
                rows: block,
                state: AtomicU8::new(ChunkState::Fresh as u8),
                expires_at,
                tables: tables.clone(),
                complete,
                next,
            }));
        }
        // At least one block exists.
        next.unwrap_or_else(|| {
            Arc::new(CacheChunk {
                rows: Vec::new(),
                state: AtomicU8::new(ChunkState::Fresh as u8),
                expires_at,
                tables,
                complete,
                next: None,
            })
        })
    }

    pub fn state(&self) -> ChunkState {
        ChunkState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the chunk can still be read, expiring it if its timeout has
    /// elapsed.
    pub fn is_valid(&self, now: Instant) -> bool {
        match self.state() {
            ChunkState::Fresh if now < self.expires_at => true,
            ChunkState::Fresh => {
                self.transition(ChunkState::Expired);
                false
            }
            _ => false,
        }
    }

    /// Mark this chunk and the rest of its chain invalidated.
    pub fn invalidate(&self) {
        let mut chunk = Some(self);
        while let Some(c) = chunk {
            c.transition(ChunkState::Invalidated);
            chunk = c.next.as_deref();
        }
    }

    fn transition(&self, to: ChunkState) {
        // Terminal states are never left.
        let _ = self.state.compare_exchange(
            ChunkState::Fresh as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn depends_on(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn rows(&self) -> &[Vec<CachedValue>] {
        &self.rows
    }

    pub fn next(&self) -> Option<&Arc<CacheChunk>> {
        self.next.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Rows of this chunk and every following chunk.
    pub fn chain_rows(&self) -> impl Iterator<Item = &Vec<CachedValue>> {
        let mut chunk = Some(self);
        std::iter::from_fn(move || {
            let c = chunk?;
            chunk = c.next.as_deref();
            Some(c.rows.iter())
        })
        .flatten()
    }

    pub fn chain_len(&self) -> usize {
        let mut len = 0;
        let mut chunk = Some(self);
        while let Some(c) = chunk {
            len += c.rows.len();
            chunk = c.next.as_deref();
        }
        len
    }
}
