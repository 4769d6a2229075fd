//! Single-space free-space manager ("Simple").
//!
//! One monotonically advancing `fileFreePosition`. Freed spans at the
//! tail shrink it back; freed spans in the middle are recorded as lost
//! and never reused online — only a defrag pass, run externally,
//! reclaims them. See DESIGN.md for how this crate resolves the open
//! question of when that lookup is actually consulted.

use super::{Error, FreeSpaceManager};
use crate::cache::{self, FreeSpaceSink};
use crate::config::Config;
use std::collections::BTreeMap;

pub const DEFAULT_SPACE: u32 = 0;

pub struct SimpleSpaceManager {
    header_end: u64,
    file_block_size: u64,
    file_free_position: u64,
    /// Freed-middle spans, keyed by offset, reported as lost until a
    /// defrag pass reclaims them.
    lost: BTreeMap<u64, u64>,
}

impl SimpleSpaceManager {
    pub fn new(header_end: u64, file_block_size: u64) -> Self {
        SimpleSpaceManager {
            header_end,
            file_block_size,
            file_free_position: header_end,
            lost: BTreeMap::new(),
        }
    }

    /// Builds a manager whose allocation unit matches `config`'s scale,
    /// the same unit `DiskRowStore` uses to turn an encoded row's byte
    /// length into a block count.
    pub fn from_config(header_end: u64, config: &Config) -> Self {
        SimpleSpaceManager::new(header_end, config.scale.max(1) as u64)
    }

    pub fn file_free_position(&self) -> u64 {
        self.file_free_position
    }
}

impl FreeSpaceManager for SimpleSpaceManager {
    fn get_default_table_space(&self) -> u32 {
        DEFAULT_SPACE
    }

    fn get_table_space(&mut self, _id: u32) -> u32 {
        DEFAULT_SPACE
    }

    fn get_new_table_space_id(&mut self) -> u32 {
        // The simple variant has exactly one space; every table shares it.
        DEFAULT_SPACE
    }

    fn get_file_blocks(&mut self, _space_id: u32, block_count: u32) -> Result<u64, Error> {
        let size = block_count as u64 * self.file_block_size;
        let prior = self.file_free_position;
        self.file_free_position += size;
        Ok(prior)
    }

    fn free_table_space(&mut self, _space_id: u32, offset: u64, limit: u64) -> Result<(), Error> {
        let end = offset + limit;
        if end == self.file_free_position {
            self.file_free_position = offset;
            // A freed span might now abut another tail-adjacent lost
            // span that was waiting behind it; fold those in too.
            while let Some((&last_offset, &last_len)) = self.lost.range(..self.file_free_position).next_back() {
                if last_offset + last_len == self.file_free_position {
                    self.file_free_position = last_offset;
                    self.lost.remove(&last_offset);
                } else {
                    break;
                }
            }
        } else {
            self.lost.insert(offset, limit);
        }
        Ok(())
    }

    fn get_lost_blocks_size(&self) -> u64 {
        self.lost.values().sum()
    }

    fn initialise_spaces(&mut self) -> Result<(), Error> {
        // A from-disk reopen would rescan the header/store here to
        // rebuild `lost`; this manager keeps it resident for its whole
        // process lifetime, so there is nothing to rebuild.
        Ok(())
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.file_free_position = self.header_end;
        self.lost.clear();
        Ok(())
    }

    fn is_multi_space(&self) -> bool {
        false
    }
}

impl FreeSpaceSink for SimpleSpaceManager {
    fn free(&mut self, position: i64, size: u32) -> Result<(), cache::Error> {
        self.free_table_space(DEFAULT_SPACE, position as u64, size as u64)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_monotonically() {
        let mut mgr = SimpleSpaceManager::new(256, 8);
        let a = mgr.get_file_blocks(0, 4).unwrap();
        let b = mgr.get_file_blocks(0, 2).unwrap();
        assert_eq!(a, 256);
        assert_eq!(b, 256 + 32);
    }

    #[test]
    fn tail_free_shrinks_free_position() {
        let mut mgr = SimpleSpaceManager::new(256, 8);
        let a = mgr.get_file_blocks(0, 4).unwrap();
        mgr.free_table_space(0, a, 32).unwrap();
        assert_eq!(mgr.file_free_position(), 256);
        assert_eq!(mgr.get_lost_blocks_size(), 0);
    }

    #[test]
    fn middle_free_is_reported_as_lost() {
        let mut mgr = SimpleSpaceManager::new(256, 8);
        let a = mgr.get_file_blocks(0, 4).unwrap();
        let _b = mgr.get_file_blocks(0, 4).unwrap();
        mgr.free_table_space(0, a, 32).unwrap();
        assert_eq!(mgr.get_lost_blocks_size(), 32);
    }

    #[test]
    fn adjacent_tail_frees_coalesce() {
        let mut mgr = SimpleSpaceManager::new(256, 8);
        let a = mgr.get_file_blocks(0, 4).unwrap();
        let b = mgr.get_file_blocks(0, 4).unwrap();
        mgr.free_table_space(0, a, 32).unwrap(); // middle: lost
        mgr.free_table_space(0, b, 32).unwrap(); // tail: shrinks, then folds `a` in
        assert_eq!(mgr.file_free_position(), 256);
        assert_eq!(mgr.get_lost_blocks_size(), 0);
    }
}
