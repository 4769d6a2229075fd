//! Data-file cache: an LRU-ish cache of fixed-aligned row objects over
//! backend A, mediating every on-disk row read/write so the store and
//! AVL index never touch the backend directly.
//!
//! Grounded on the teacher's `pager::Pager`, generalized the same way
//! `backend` generalizes it: the teacher's pager cached whole read-only
//! pages keyed by page number; this cache holds identity-stable,
//! mutable row objects keyed by file position, with write-through and
//! eviction. The whole cache sits behind one write lock owned by
//! whoever holds it (the row store); that's why every method
//! here takes `&mut self` rather than managing its own internal
//! locking — the `Arc<Mutex<Row>>` handles it returns are what stay
//! identity-stable for callers holding onto a row past the cache call
//! that produced it.

use crate::backend::RandomAccessBackend;
use crate::config::Config;
use crate::header::Scale;
use crate::row::{codec, Row};
use crate::shadow::ShadowLog;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("backend I/O failure: {0}")]
    Backend(#[from] crate::backend::Error),
    #[error("shadow log failure: {0}")]
    Shadow(#[from] crate::shadow::Error),
    #[error("row codec failure: {0}")]
    Row(#[from] crate::row::Error),
    #[error("no cached or on-disk object at position {0}")]
    NotFound(i64),
}

/// The cache's collaborator for reclaiming freed spans. Defined here,
/// implemented by the free-space manager, the same dependency-inversion
/// shape as `avl::NodeSource`.
pub trait FreeSpaceSink {
    fn free(&mut self, position: i64, size: u32) -> Result<(), Error>;
}

struct Entry {
    row: Arc<Mutex<Row>>,
    dirty: bool,
    last_used: u64,
    size: u64,
}

pub struct DataFileCache {
    backend: Box<dyn RandomAccessBackend>,
    shadow: Option<ShadowLog>,
    scale: Scale,
    num_indexes: usize,
    max_rows: usize,
    max_bytes: u64,
    write_delay_ms: u32,
    clock: u64,
    resident_bytes: u64,
    entries: HashMap<i64, Entry>,
}

impl DataFileCache {
    /// `max_rows`/`max_bytes` come straight from `config.cache_rows` /
    /// `config.cache_size_bytes`, the bounds `evict_if_needed` enforces.
    pub fn new(
        backend: Box<dyn RandomAccessBackend>,
        shadow: Option<ShadowLog>,
        scale: Scale,
        num_indexes: usize,
        config: &Config,
    ) -> Self {
        DataFileCache {
            backend,
            shadow,
            scale,
            num_indexes,
            max_rows: config.cache_rows,
            max_bytes: config.cache_size_bytes,
            write_delay_ms: config.write_delay_ms,
            clock: 0,
            resident_bytes: 0,
            entries: HashMap::new(),
        }
    }

    /// Group-commit delay from `config.write_delay_ms`: how long a
    /// caller driving periodic `sync` calls should wait between them.
    /// 0 means every `commit_persistence` should be followed by a sync
    /// with no batching.
    pub fn write_delay_ms(&self) -> u32 {
        self.write_delay_ms
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Returns the row at `position`, loading it from A if not resident.
    /// `keep=true` pins it against eviction. Two `get` calls for the same
    /// position return the same `Arc`, so mutation through either is
    /// visible to both.
    pub fn get(&mut self, position: i64, keep: bool) -> Result<Arc<Mutex<Row>>, Error> {
        let now = self.tick();
        if let Some(entry) = self.entries.get_mut(&position) {
            entry.last_used = now;
            if keep {
                entry.row.lock().unwrap().pin();
            }
            return Ok(entry.row.clone());
        }

        let mut row = self.load_from_backend(position)?;
        if keep {
            row.pin();
        }
        let size = row.storage_size as u64;
        let shared = Arc::new(Mutex::new(row));
        self.entries.insert(
            position,
            Entry {
                row: shared.clone(),
                dirty: false,
                last_used: now,
                size,
            },
        );
        self.resident_bytes += size;
        self.evict_if_needed(Some(position))?;
        Ok(shared)
    }

    fn load_from_backend(&mut self, position: i64) -> Result<Row, Error> {
        let mut size_buf = [0u8; 4];
        self.backend.read_at(position as u64, &mut size_buf)?;
        let size = u32::from_be_bytes(size_buf) as usize;
        let mut image = vec![0u8; size];
        self.backend.read_at(position as u64, &mut image)?;
        let mut row = codec::decode(&image, self.num_indexes)?;
        row.position = position;
        row.is_in_memory = false;
        row.is_new = false;
        Ok(row)
    }

    /// Makes `row` resident and dirty (a newly inserted row, already
    /// assigned a position by the free-space manager).
    pub fn add(&mut self, mut row: Row) -> Result<Arc<Mutex<Row>>, Error> {
        debug_assert!(row.position >= 0, "row must have an assigned position before caching");
        row.is_new = false;
        row.is_in_memory = false;
        let position = row.position;
        let size = row.storage_size as u64;
        let shared = Arc::new(Mutex::new(row));
        let now = self.tick();
        self.entries.insert(
            position,
            Entry {
                row: shared.clone(),
                dirty: true,
                last_used: now,
                size,
            },
        );
        self.resident_bytes += size;
        self.evict_if_needed(Some(position))?;
        Ok(shared)
    }

    /// Marks the resident row at `position` dirty, so it is rewritten on
    /// the next flush/eviction.
    pub fn mark_dirty(&mut self, position: i64) {
        if let Some(entry) = self.entries.get_mut(&position) {
            entry.dirty = true;
        }
    }

    /// Drops `position` from the cache and tells `sink` to reclaim its
    /// on-disk span. Does not itself flush — the caller should not still
    /// want the bytes.
    pub fn remove(&mut self, position: i64, sink: &mut dyn FreeSpaceSink) -> Result<(), Error> {
        let size = match self.entries.remove(&position) {
            Some(entry) => {
                self.resident_bytes -= entry.size;
                entry.row.lock().unwrap().storage_size
            }
            None => self.load_from_backend(position)?.storage_size,
        };
        sink.free(position, size)
    }

    /// Flushes one resident row's bytes to A, first copying its
    /// before-image to the shadow log: before any write to A that
    /// mutates an already-written page, the cache calls the shadow
    /// log's `copy` for the affected page range.
    pub fn commit_persistence(&mut self, position: i64) -> Result<(), Error> {
        let (image, size) = {
            let entry = self.entries.get(&position).ok_or(Error::NotFound(position))?;
            let row = entry.row.lock().unwrap();
            let image = codec::encode(&row, self.scale)?;
            (image, row.storage_size as u64)
        };
        if let Some(shadow) = self.shadow.as_mut() {
            shadow.copy(self.backend.as_mut(), position as u64, size)?;
        }
        self.backend.write_at(position as u64, &image)?;
        if let Some(entry) = self.entries.get_mut(&position) {
            entry.dirty = false;
        }
        Ok(())
    }

    /// Evicts unpinned least-recently-used entries until the cache is back
    /// within its row and byte bounds. A dirty candidate is written
    /// through to A before being dropped, not merely skipped.
    fn evict_if_needed(&mut self, protect: Option<i64>) -> Result<(), Error> {
        loop {
            if self.entries.len() <= self.max_rows && self.resident_bytes <= self.max_bytes {
                break;
            }
            let candidate = self
                .entries
                .iter()
                .filter(|(pos, e)| Some(**pos) != protect && e.row.lock().unwrap().keep_count == 0)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(pos, _)| *pos);
            match candidate {
                Some(pos) => {
                    if self.entries.get(&pos).is_some_and(|e| e.dirty) {
                        self.commit_persistence(pos)?;
                    }
                    if let Some(entry) = self.entries.remove(&pos) {
                        self.resident_bytes -= entry.size;
                    }
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Flushes every dirty entry, then forces A to stable storage.
    pub fn sync(&mut self) -> Result<(), Error> {
        let dirty_positions: Vec<i64> = self
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(pos, _)| *pos)
            .collect();
        for pos in dirty_positions {
            self.commit_persistence(pos)?;
        }
        if let Some(shadow) = self.shadow.as_mut() {
            shadow.synch()?;
        }
        self.backend.sync()?;
        Ok(())
    }
}
