//! Row store: bridges rows to the AVL indexes and the data-file cache.
//! Three variants share the `RowStore` trait below — memory, hybrid,
//! and disk — mirroring how the teacher's `table_traits.rs` lets
//! `stored_table.rs` and `temp_table.rs` share one `BackingTable`
//! surface despite very different backing storage.
//!
//! Session/transaction bookkeeping (the `tx`/MVCC action parameters a
//! SQL engine's operation signatures typically carry) is the
//! transaction manager's job, explicitly out of this crate's scope;
//! these operations take and return plain row positions instead.

pub mod disk;
pub mod hybrid;
pub mod memory;

use crate::avl::IndexSpec;
use crate::row::Row;
use std::sync::{Arc, Mutex};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("AVL index failure: {0}")]
    Avl(#[from] crate::avl::Error),
    #[error("cache failure: {0}")]
    Cache(#[from] crate::cache::Error),
    #[error("row codec failure: {0}")]
    Row(#[from] crate::row::Error),
    #[error("free-space manager failure: {0}")]
    Space(#[from] crate::space::Error),
    #[error("no row at position {0}")]
    NotFound(i64),
    #[error("column map length does not match source row arity")]
    ColumnMapMismatch,
}

/// Per-table operations consumed by the executor. `keep` mirrors the
/// cache's pin semantics for `get`.
pub trait RowStore {
    /// Inserts `row`, links it into every index, and returns its
    /// (synthetic or on-disk) position.
    fn add(&mut self, row: Row) -> Result<i64, Error>;

    /// Unlinks `position` from every index and marks it removed.
    fn delete(&mut self, position: i64) -> Result<(), Error>;

    /// Links an already-resident row into every index, for bulk-load
    /// after a table rewrite.
    fn index_row(&mut self, position: i64) -> Result<(), Error>;

    /// Rebuilds every index from the rows currently resident, in
    /// primary-key order.
    fn index_rows(&mut self) -> Result<(), Error>;

    /// Finalizes a provisional insert/delete (no-op beyond bookkeeping
    /// here, since commit/rollback coordination belongs to the
    /// transaction manager).
    fn commit_row(&mut self, position: i64) -> Result<(), Error>;

    /// Reverts a provisional insert by deleting it, or a provisional
    /// delete by re-adding it, per `was_insert`.
    fn rollback_row(&mut self, position: i64, was_insert: bool) -> Result<(), Error>;

    fn get(&mut self, position: i64, keep: bool) -> Result<Arc<Mutex<Row>>, Error>;

    /// Rows in primary-key (index 0) order.
    fn row_iterator(&mut self) -> Result<Box<dyn Iterator<Item = Row> + '_>, Error>;

    /// An estimator used by the planner; proportional to tree depth for
    /// an index scan, or to row count for a full scan.
    fn search_cost(&self, index_id: usize, op_is_full_scan: bool) -> f64;

    /// Re-serializes every row through a freshly built destination store
    /// (ALTER TABLE-style column transformation), applying `col_map`
    /// (destination column -> source column index, `None` for a new
    /// column defaulting to NULL).
    fn move_data(&mut self, dest: &mut dyn RowStore, col_map: &[Option<usize>]) -> Result<(), Error>;

    /// Rebuilds a single index in place.
    fn reindex(&mut self, index_id: usize) -> Result<(), Error>;

    /// Sets the accessor (root) of `index_id` directly, used during
    /// catalog bootstrap.
    fn set_accessor(&mut self, index_id: usize, accessor: i64);

    fn accessor(&self, index_id: usize) -> i64;

    fn index_specs(&self) -> &[IndexSpec];
}
