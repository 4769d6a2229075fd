//! Balanced ordered index over rows, replacing the teacher's read-only
//! SQLite b-tree (`btree/` — table b-trees with interior/leaf pages)
//! with the AVL tree this engine actually uses for its live, mutable
//! indexes. The per-node cursor style
//! (`next`/`last` walking parent/left/right by position) is the same
//! shape as the teacher's page-cursor iterators in `btree::table` and
//! `btree::interior`, just over AVL links instead of b-tree cell offsets.

pub mod index;

pub use index::AvlIndex;

use crate::row::Row;
use crate::value::{compare_values, NullOrder};
use std::cmp::Ordering;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("duplicate key violates a unique index")]
    DuplicateKey,
    #[error("AVL index is corrupt: {0}")]
    CorruptIndex(String),
    #[error("underlying store error: {0}")]
    Host(String),
}

/// Sentinel for "no row"/"no parent" in a position-addressed link.
pub const NULL_POS: i64 = -1;

/// Index definition.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Also used as the slot index into `Row::nodes`.
    pub id: usize,
    pub columns: Vec<usize>,
    pub ascending: Vec<bool>,
    pub nulls_last: Vec<bool>,
    pub unique: bool,
    pub primary_key: bool,
    pub for_constraint: bool,
    pub auto_fk_forward: bool,
}

impl IndexSpec {
    pub fn simple(id: usize, column: usize, unique: bool) -> Self {
        IndexSpec {
            id,
            columns: vec![column],
            ascending: vec![true],
            nulls_last: vec![true],
            unique,
            primary_key: unique,
            for_constraint: false,
            auto_fk_forward: false,
        }
    }
}

/// Compares two rows' index keys only (ignores row identity) — the
/// declared collation/direction comparator for an index.
pub fn compare_keys(a: &Row, b: &Row, spec: &IndexSpec) -> Ordering {
    for (i, &col) in spec.columns.iter().enumerate() {
        let ascending = spec.ascending.get(i).copied().unwrap_or(true);
        let null_order = if spec.nulls_last.get(i).copied().unwrap_or(true) {
            NullOrder::Last
        } else {
            NullOrder::First
        };
        let mut ord = compare_values(&a.fields[col], &b.fields[col], null_order);
        if !ascending {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Total order used to place a row in the tree: the declared key order,
/// with ties on a non-unique index broken by row position (physical
/// insertion order).
pub fn compare_for_tree(a: &Row, b: &Row, spec: &IndexSpec) -> Ordering {
    let key_order = compare_keys(a, b, spec);
    if key_order != Ordering::Equal || spec.unique {
        return key_order;
    }
    a.position.cmp(&b.position)
}

/// Abstracts row/node access over whichever row store variant (memory,
/// hybrid, disk) hosts the index, so the AVL algorithm in `index.rs` is
/// written once. Disk variants route through the data-file cache; the
/// memory variant is a direct in-process lookup.
pub trait NodeSource {
    fn fetch_row(&mut self, position: i64) -> Result<Row, Error>;
    fn store_node(&mut self, position: i64, index_id: usize, node: crate::row::Node) -> Result<(), Error>;
}
