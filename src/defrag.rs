//! Defragmenter: rewrites a table's storage compactly.
//!
//! Rather than literally translating AVL node links through an
//! old-offset -> new-offset lookup, this defragmenter walks the source
//! store's primary key in order and re-inserts every row into a fresh
//! destination store — the same "full scan + fresh insert" primitive
//! `store::RowStore::move_data`/`reindex` already use. `PositionLookup`
//! is kept anyway as more than plumbing for the link-translation
//! approach: a mismatch between rows traversed and rows recorded in it
//! is itself a corruption signal worth logging.

use crate::config::Config;
use crate::logging::Logger;
use crate::row::Row;
use crate::space::LostBlocksReport;
use crate::store::{Error as StoreError, RowStore};
use std::collections::HashMap;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("row store failure during defragmentation: {0}")]
    Store(#[from] StoreError),
    #[error("defragmentation ran out of memory; partial output discarded")]
    OutOfMemory,
}

/// Old position -> new position. The source system keeps separate
/// 32-bit and 64-bit variants of this lookup depending on whether the
/// original file fit 32-bit addressing under its scale; this crate
/// always addresses rows by `i64`, so one map serves both cases.
#[derive(Default)]
pub struct PositionLookup {
    map: HashMap<i64, i64>,
}

impl PositionLookup {
    pub fn new() -> Self {
        PositionLookup::default()
    }

    pub fn record(&mut self, old: i64, new: i64) {
        self.map.insert(old, new);
    }

    pub fn translate(&self, old: i64) -> Option<i64> {
        self.map.get(&old).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Accessor roots and row counts before/after a defrag pass, for the
/// caller to write into the catalog and for tests to assert compaction
/// actually happened.
pub struct DefragReport {
    pub rows_traversed: usize,
    pub rows_in_lookup: usize,
    pub old_index_roots: Vec<i64>,
    pub new_index_roots: Vec<i64>,
}

/// Checks `config.defrag_limit_percent` against a table's lost-block
/// report: a catalog driving periodic defrag passes calls this before
/// paying for a full `defragment_table` run.
pub fn should_defragment(lost: &LostBlocksReport, data_file_size: u64, config: &Config) -> bool {
    if data_file_size == 0 {
        return false;
    }
    let lost_percent = lost.total.saturating_mul(100) / data_file_size;
    lost_percent >= config.defrag_limit_percent as u64
}

/// Rewrites `source` into `dest` (assumed freshly constructed, empty,
/// sharing `source`'s `IndexSpec`s) by walking the primary key in order
/// and re-inserting every row. `dest`'s accessor roots after this call
/// are the table's new roots: translating the old roots through the
/// lookup is trivial here since every row was freshly inserted rather
/// than relocated in place.
///
/// On success, `dest` is the compacted replacement for `source`; the
/// caller is responsible for the final atomic swap (step 5), which is a
/// catalog/file-system concern outside this crate.
pub fn defragment_table(
    source: &mut dyn RowStore,
    dest: &mut dyn RowStore,
    logger: &dyn Logger,
) -> Result<DefragReport, Error> {
    let num_indexes = dest.index_specs().len();
    let mut lookup = PositionLookup::new();
    let mut rows_traversed = 0usize;
    let old_index_roots: Vec<i64> = (0..source.index_specs().len())
        .map(|i| source.accessor(i))
        .collect();

    let rows: Vec<Row> = source.row_iterator()?.collect();
    for row in rows {
        rows_traversed += 1;
        let old_position = row.position;
        let mut fresh = Row::new(row.fields.clone(), num_indexes);
        fresh.position = crate::avl::NULL_POS;
        let new_position = dest.add(fresh)?;
        lookup.record(old_position, new_position);
    }

    if lookup.len() != rows_traversed {
        logger.warn(
            "defrag",
            &format!(
                "row count mismatch during defragmentation: traversed {} rows but recorded {} in the position lookup",
                rows_traversed,
                lookup.len()
            ),
        );
    }

    let new_index_roots: Vec<i64> = (0..dest.index_specs().len())
        .map(|i| dest.accessor(i))
        .collect();

    Ok(DefragReport {
        rows_traversed,
        rows_in_lookup: lookup.len(),
        old_index_roots,
        new_index_roots,
    })
}
