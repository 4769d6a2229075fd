//! Hybrid row store variant ("Hybrid"): starts as a
//! `MemoryRowStore` and switches over to a `DiskRowStore` once a
//! threshold (row count or cache pressure) is crossed. The switch-over
//! walks the primary key in order, re-serializing each row through the
//! cache at a freshly allocated position, and rebuilds every accessor in
//! a scratch `DiskRowStore` before swapping it in — matching the way
//! `MemoryRowStore` and `DiskRowStore` each implement the same
//! `RowStore` trait so that swap is just replacing which one `self`
//! delegates to.

use super::{disk::DiskRowStore, memory::MemoryRowStore, Error, RowStore};
use crate::avl::IndexSpec;
use crate::cache::DataFileCache;
use crate::row::Row;
use crate::space::FreeSpaceManager;
use std::sync::{Arc, Mutex};

enum Backing {
    Memory(MemoryRowStore),
    Disk(DiskRowStore),
}

/// Parameters needed to materialize the disk side, supplied up front so
/// the switch-over can build a `DiskRowStore` without the caller's
/// involvement.
pub struct DiskMaterializer {
    pub cache: DataFileCache,
    pub space: Box<dyn FreeSpaceManager>,
    pub scale_units: u64,
}

pub struct HybridRowStore {
    backing: Backing,
    specs: Vec<IndexSpec>,
    row_count_threshold: usize,
    materializer: Option<DiskMaterializer>,
}

impl HybridRowStore {
    pub fn new(specs: Vec<IndexSpec>, row_count_threshold: usize, materializer: DiskMaterializer) -> Self {
        HybridRowStore {
            backing: Backing::Memory(MemoryRowStore::new(specs.clone())),
            specs,
            row_count_threshold,
            materializer: Some(materializer),
        }
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self.backing, Backing::Disk(_))
    }

    fn row_count_hint(&mut self) -> Result<usize, Error> {
        match &mut self.backing {
            Backing::Memory(m) => Ok(m.row_iterator()?.count()),
            Backing::Disk(_) => Ok(0),
        }
    }

    /// Re-serializes every row, in primary-key order, from the in-memory
    /// backing into a fresh `DiskRowStore`, then swaps it in. A no-op if
    /// already on disk.
    pub fn switch_to_disk(&mut self) -> Result<(), Error> {
        if self.is_on_disk() {
            return Ok(());
        }
        let materializer = self
            .materializer
            .take()
            .expect("switch_to_disk called more than once");
        let mut disk = DiskRowStore::new(
            self.specs.clone(),
            materializer.cache,
            materializer.space,
            materializer.scale_units,
        );
        if let Backing::Memory(mem) = &mut self.backing {
            for row in mem.row_iterator()? {
                let mut fresh = Row::new(row.fields.clone(), self.specs.len());
                fresh.position = crate::avl::NULL_POS;
                disk.add(fresh)?;
            }
        }
        self.backing = Backing::Disk(disk);
        Ok(())
    }

    /// Checks the row-count threshold and switches over if it has been
    /// crossed. Callers invoke this after `add`; kept separate from
    /// `add` itself so a caller that wants to defer the switch (e.g.
    /// mid-bulk-load) can.
    pub fn maybe_switch_to_disk(&mut self) -> Result<(), Error> {
        if self.is_on_disk() {
            return Ok(());
        }
        if self.row_count_hint()? >= self.row_count_threshold {
            self.switch_to_disk()?;
        }
        Ok(())
    }
}

impl RowStore for HybridRowStore {
    fn add(&mut self, row: Row) -> Result<i64, Error> {
        let position = match &mut self.backing {
            Backing::Memory(m) => m.add(row),
            Backing::Disk(d) => d.add(row),
        }?;
        self.maybe_switch_to_disk()?;
        Ok(position)
    }

    fn delete(&mut self, position: i64) -> Result<(), Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.delete(position),
            Backing::Disk(d) => d.delete(position),
        }
    }

    fn index_row(&mut self, position: i64) -> Result<(), Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.index_row(position),
            Backing::Disk(d) => d.index_row(position),
        }
    }

    fn index_rows(&mut self) -> Result<(), Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.index_rows(),
            Backing::Disk(d) => d.index_rows(),
        }
    }

    fn commit_row(&mut self, position: i64) -> Result<(), Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.commit_row(position),
            Backing::Disk(d) => d.commit_row(position),
        }
    }

    fn rollback_row(&mut self, position: i64, was_insert: bool) -> Result<(), Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.rollback_row(position, was_insert),
            Backing::Disk(d) => d.rollback_row(position, was_insert),
        }
    }

    fn get(&mut self, position: i64, keep: bool) -> Result<Arc<Mutex<Row>>, Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.get(position, keep),
            Backing::Disk(d) => d.get(position, keep),
        }
    }

    fn row_iterator(&mut self) -> Result<Box<dyn Iterator<Item = Row> + '_>, Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.row_iterator(),
            Backing::Disk(d) => d.row_iterator(),
        }
    }

    fn search_cost(&self, index_id: usize, op_is_full_scan: bool) -> f64 {
        match &self.backing {
            Backing::Memory(m) => m.search_cost(index_id, op_is_full_scan),
            Backing::Disk(d) => d.search_cost(index_id, op_is_full_scan),
        }
    }

    fn move_data(&mut self, dest: &mut dyn RowStore, col_map: &[Option<usize>]) -> Result<(), Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.move_data(dest, col_map),
            Backing::Disk(d) => d.move_data(dest, col_map),
        }
    }

    fn reindex(&mut self, index_id: usize) -> Result<(), Error> {
        match &mut self.backing {
            Backing::Memory(m) => m.reindex(index_id),
            Backing::Disk(d) => d.reindex(index_id),
        }
    }

    fn set_accessor(&mut self, index_id: usize, accessor: i64) {
        match &mut self.backing {
            Backing::Memory(m) => m.set_accessor(index_id, accessor),
            Backing::Disk(d) => d.set_accessor(index_id, accessor),
        }
    }

    fn accessor(&self, index_id: usize) -> i64 {
        match &self.backing {
            Backing::Memory(m) => m.accessor(index_id),
            Backing::Disk(d) => d.accessor(index_id),
        }
    }

    fn index_specs(&self) -> &[IndexSpec] {
        &self.specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::buffered::BufferedBackend;
    use crate::config::Config;
    use crate::header::Scale;
    use crate::space::simple::SimpleSpaceManager;
    use crate::value::SqlValue;

    fn temp_backend() -> BufferedBackend {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let (_file, path) = tmp.keep().unwrap();
        BufferedBackend::open(path, false).unwrap()
    }

    fn fresh_hybrid(threshold: usize) -> HybridRowStore {
        let specs = vec![IndexSpec::simple(0, 0, true)];
        let config = Config {
            cache_rows: 64,
            ..Config::default()
        };
        let cache = DataFileCache::new(Box::new(temp_backend()), None, Scale::new(1).unwrap(), 1, &config);
        let space = Box::new(SimpleSpaceManager::new(256, 1));
        let materializer = DiskMaterializer {
            cache,
            space,
            scale_units: 1,
        };
        HybridRowStore::new(specs, threshold, materializer)
    }

    #[test]
    fn stays_in_memory_below_threshold() {
        let mut store = fresh_hybrid(10);
        store.add(Row::new(vec![SqlValue::Int(1)], 1)).unwrap();
        assert!(!store.is_on_disk());
    }

    #[test]
    fn switches_to_disk_once_threshold_crossed() {
        let mut store = fresh_hybrid(3);
        for v in 0..4 {
            store.add(Row::new(vec![SqlValue::Int(v)], 1)).unwrap();
        }
        assert!(store.is_on_disk());
    }

    #[test]
    fn rows_survive_the_switch_in_order() {
        let mut store = fresh_hybrid(3);
        for v in [5, 1, 9, 2] {
            store.add(Row::new(vec![SqlValue::Int(v)], 1)).unwrap();
        }
        assert!(store.is_on_disk());
        let values: Vec<i32> = store
            .row_iterator()
            .unwrap()
            .map(|r| match r.fields[0] {
                SqlValue::Int(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec![1, 2, 5, 9]);
    }
}
