//! Multi-space ("blocks") free-space manager ("Blocks").
//!
//! The file past the header is partitioned into fixed-size file blocks,
//! each owned by exactly one table space. A directory tracks each file
//! block's owner and occupancy; each table space additionally keeps a
//! small bounded free list of spans freed within its own blocks, so
//! small churn (row update/delete/reinsert) doesn't immediately show up
//! as lost space the way the simple variant's does.

use super::{Error, FreeSpaceManager, LostBlocksReport};
use crate::cache::{self, FreeSpaceSink};
use crate::config::Config;
use std::collections::HashMap;

/// Bytes per file block: `1 MiB * S / 16`, with `S` folded in by the
/// caller (passed in as `file_block_size` already scaled).
pub struct FileBlockEntry {
    pub space_id: u32,
    pub used_items: u32,
    pub free_items: u32,
    pub free_item_count: u32,
}

struct TableSpaceState {
    current_block: Option<usize>,
    current_offset: u64,
    free_list: Vec<(u64, u64)>,
}

impl TableSpaceState {
    fn new() -> Self {
        TableSpaceState {
            current_block: None,
            current_offset: 0,
            free_list: Vec::new(),
        }
    }
}

pub struct BlocksSpaceManager {
    header_end: u64,
    file_block_size: u64,
    max_free_blocks: usize,
    directory: Vec<FileBlockEntry>,
    spaces: HashMap<u32, TableSpaceState>,
    next_space_id: u32,
    lost_total: u64,
    lost_per_space: HashMap<u32, u64>,
}

const DEFAULT_SPACE: u32 = 0;

impl BlocksSpaceManager {
    pub fn new(header_end: u64, file_block_size: u64, max_free_blocks: usize) -> Self {
        let mut spaces = HashMap::new();
        spaces.insert(DEFAULT_SPACE, TableSpaceState::new());
        BlocksSpaceManager {
            header_end,
            file_block_size,
            max_free_blocks,
            directory: Vec::new(),
            spaces,
            next_space_id: DEFAULT_SPACE + 1,
            lost_total: 0,
            lost_per_space: HashMap::new(),
        }
    }

    /// Builds a manager sized from `config`: `max_free_blocks` bounds
    /// each table space's free list, and the file block size is derived
    /// from `config.scale` the same way the single-space variant's
    /// allocation unit is.
    pub fn from_config(header_end: u64, config: &Config) -> Self {
        let file_block_size = 1024 * 1024 * config.scale.max(1) as u64 / 16;
        BlocksSpaceManager::new(header_end, file_block_size, config.max_free_blocks)
    }

    fn block_offset(&self, block_index: usize) -> u64 {
        self.header_end + block_index as u64 * self.file_block_size
    }

    fn allocate_new_block(&mut self, space_id: u32) -> usize {
        self.directory.push(FileBlockEntry {
            space_id,
            used_items: 0,
            free_items: 0,
            free_item_count: 0,
        });
        self.directory.len() - 1
    }
}

impl FreeSpaceManager for BlocksSpaceManager {
    fn get_default_table_space(&self) -> u32 {
        DEFAULT_SPACE
    }

    fn get_table_space(&mut self, id: u32) -> u32 {
        self.spaces.entry(id).or_insert_with(TableSpaceState::new);
        id
    }

    fn get_new_table_space_id(&mut self) -> u32 {
        let id = self.next_space_id;
        self.next_space_id += 1;
        self.spaces.insert(id, TableSpaceState::new());
        id
    }

    fn get_file_blocks(&mut self, space_id: u32, block_count: u32) -> Result<u64, Error> {
        if !self.spaces.contains_key(&space_id) {
            return Err(Error::UnknownSpace(space_id));
        }
        let requested = block_count as u64;

        // First-fit against this space's own bounded free list.
        let free_list_hit = {
            let state = self.spaces.get(&space_id).unwrap();
            state
                .free_list
                .iter()
                .position(|&(_, len)| len >= requested)
        };
        if let Some(idx) = free_list_hit {
            let state = self.spaces.get_mut(&space_id).unwrap();
            let (offset, len) = state.free_list.remove(idx);
            if len > requested {
                state.free_list.push((offset + requested, len - requested));
            }
            return Ok(offset);
        }

        // Otherwise extend the current block, or request a new one.
        let needs_new_block = {
            let state = self.spaces.get(&space_id).unwrap();
            match state.current_block {
                None => true,
                Some(idx) => state.current_offset + requested > self.block_offset(idx) + self.file_block_size,
            }
        };
        if needs_new_block {
            let new_block = self.allocate_new_block(space_id);
            let state = self.spaces.get_mut(&space_id).unwrap();
            state.current_block = Some(new_block);
            state.current_offset = self.block_offset(new_block);
        }

        let state = self.spaces.get_mut(&space_id).unwrap();
        let offset = state.current_offset;
        state.current_offset += requested;
        let block_idx = state.current_block.unwrap();
        self.directory[block_idx].used_items += 1;
        Ok(offset)
    }

    fn free_table_space(&mut self, space_id: u32, offset: u64, limit: u64) -> Result<(), Error> {
        let state = self
            .spaces
            .get_mut(&space_id)
            .ok_or(Error::UnknownSpace(space_id))?;
        if state.free_list.len() < self.max_free_blocks {
            state.free_list.push((offset, limit));
        } else {
            self.lost_total += limit;
            *self.lost_per_space.entry(space_id).or_insert(0) += limit;
        }
        Ok(())
    }

    fn get_lost_blocks_size(&self) -> u64 {
        self.lost_total
    }

    fn initialise_spaces(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.directory.clear();
        self.lost_total = 0;
        self.lost_per_space.clear();
        for state in self.spaces.values_mut() {
            state.current_block = None;
            state.current_offset = 0;
            state.free_list.clear();
        }
        Ok(())
    }

    fn is_multi_space(&self) -> bool {
        true
    }

    fn lost_blocks_report(&self) -> LostBlocksReport {
        let mut per_space: Vec<(u32, u64)> = self.lost_per_space.iter().map(|(&id, &size)| (id, size)).collect();
        per_space.sort_by_key(|&(id, _)| id);
        LostBlocksReport {
            total: self.lost_total,
            per_space,
        }
    }
}

impl FreeSpaceSink for BlocksSpaceManager {
    fn free(&mut self, position: i64, size: u32) -> Result<(), cache::Error> {
        self.free_table_space(DEFAULT_SPACE, position as u64, size as u64)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_within_one_block_then_extends() {
        let mut mgr = BlocksSpaceManager::new(256, 64, 4);
        let a = mgr.get_file_blocks(DEFAULT_SPACE, 16).unwrap();
        let b = mgr.get_file_blocks(DEFAULT_SPACE, 16).unwrap();
        assert_eq!(a, 256);
        assert_eq!(b, 272);
        // A third allocation that doesn't fit the remaining 32 bytes of
        // the first block requests a new one.
        let c = mgr.get_file_blocks(DEFAULT_SPACE, 48).unwrap();
        assert_eq!(c, 256 + 64);
    }

    #[test]
    fn freed_span_satisfies_later_allocation_first() {
        let mut mgr = BlocksSpaceManager::new(256, 64, 4);
        let a = mgr.get_file_blocks(DEFAULT_SPACE, 16).unwrap();
        mgr.free_table_space(DEFAULT_SPACE, a, 16).unwrap();
        let b = mgr.get_file_blocks(DEFAULT_SPACE, 8).unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn free_list_overflow_reports_lost() {
        let mut mgr = BlocksSpaceManager::new(256, 64, 1);
        let a = mgr.get_file_blocks(DEFAULT_SPACE, 8).unwrap();
        let b = mgr.get_file_blocks(DEFAULT_SPACE, 8).unwrap();
        mgr.free_table_space(DEFAULT_SPACE, a, 8).unwrap();
        mgr.free_table_space(DEFAULT_SPACE, b, 8).unwrap(); // free list already full
        assert_eq!(mgr.get_lost_blocks_size(), 8);
    }

    #[test]
    fn distinct_table_spaces_allocate_independently() {
        let mut mgr = BlocksSpaceManager::new(256, 64, 4);
        let other = mgr.get_new_table_space_id();
        let a = mgr.get_file_blocks(DEFAULT_SPACE, 8).unwrap();
        let b = mgr.get_file_blocks(other, 8).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn lost_blocks_report_breaks_down_by_space() {
        let mut mgr = BlocksSpaceManager::new(256, 64, 1);
        let other = mgr.get_new_table_space_id();

        let a = mgr.get_file_blocks(DEFAULT_SPACE, 8).unwrap();
        let b = mgr.get_file_blocks(DEFAULT_SPACE, 8).unwrap();
        mgr.free_table_space(DEFAULT_SPACE, a, 8).unwrap();
        mgr.free_table_space(DEFAULT_SPACE, b, 8).unwrap(); // free list already full -> lost

        let c = mgr.get_file_blocks(other, 8).unwrap();
        mgr.free_table_space(other, c, 8).unwrap(); // first free in `other` fits its own list

        let report = mgr.lost_blocks_report();
        assert_eq!(report.total, 8);
        assert_eq!(report.per_space, vec![(DEFAULT_SPACE, 8)]);
    }
}
