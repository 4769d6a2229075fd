//! Free-space manager: owns the region of the data file past the fixed
//! header, handing out aligned spans to the row store and bookkeeping
//! what gets freed back.
//!
//! Grounded on the teacher's `pager::Pager`'s `next_page_num` counter —
//! the simplest possible "monotonic allocator" — generalized into a
//! two-variant interface, with the `simple` variant staying close to
//! that one counter and `blocks` adding the directory/free-list
//! machinery the teacher never needed (SQLite's own b-tree pages are
//! managed by SQLite itself, not by the `diydb` reader).

pub mod blocks;
pub mod simple;

use crate::cache::{self, FreeSpaceSink};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown table space {0}")]
    UnknownSpace(u32),
    #[error("free of {length} bytes at {offset} does not fit any tracked allocation")]
    BadFree { offset: u64, length: u64 },
}

impl From<Error> for cache::Error {
    fn from(_: Error) -> Self {
        // The cache only needs to know a free failed; the space-level
        // detail isn't part of its own error surface.
        cache::Error::NotFound(-1)
    }
}

/// Lost-block accounting, broken down by table space, on top of the
/// aggregate `get_lost_blocks_size`. Single-space managers report one
/// entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostBlocksReport {
    pub total: u64,
    pub per_space: Vec<(u32, u64)>,
}

/// Shared interface of both free-space manager variants.
pub trait FreeSpaceManager {
    fn get_default_table_space(&self) -> u32;
    fn get_table_space(&mut self, id: u32) -> u32;
    fn get_new_table_space_id(&mut self) -> u32;
    /// Allocates `block_count` allocation units of `space_id`'s space,
    /// returning the offset of the first byte.
    fn get_file_blocks(&mut self, space_id: u32, block_count: u32) -> Result<u64, Error>;
    fn free_table_space(&mut self, space_id: u32, offset: u64, limit: u64) -> Result<(), Error>;
    fn get_lost_blocks_size(&self) -> u64;
    fn initialise_spaces(&mut self) -> Result<(), Error>;
    fn reset(&mut self) -> Result<(), Error>;
    fn is_multi_space(&self) -> bool;

    /// Operator diagnostics breakdown. The default, suitable for any
    /// single-space variant, attributes the whole total to the default
    /// space; `BlocksSpaceManager` overrides this with a real per-space
    /// breakdown.
    fn lost_blocks_report(&self) -> LostBlocksReport {
        LostBlocksReport {
            total: self.get_lost_blocks_size(),
            per_space: vec![(self.get_default_table_space(), self.get_lost_blocks_size())],
        }
    }
}
