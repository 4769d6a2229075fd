//! Memory row store variant ("Memory"): rows live in a process-resident
//! map, keyed by a synthetic monotonically increasing position rather
//! than a file offset. Grounded on the teacher's
//! `temp_table.rs` (`Vec<Row>` backing a session-local table) — this
//! keeps that shape but adds the AVL bookkeeping `temp_table.rs` never
//! needed, since the teacher's temp tables are unindexed scan-only.

use super::{Error, RowStore};
use crate::avl::{AvlIndex, IndexSpec, NodeSource, NULL_POS};
use crate::row::{Node, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use streaming_iterator::StreamingIterator;

struct MemoryNodeSource<'a> {
    rows: &'a mut HashMap<i64, Row>,
}

impl<'a> NodeSource for MemoryNodeSource<'a> {
    fn fetch_row(&mut self, position: i64) -> Result<Row, crate::avl::Error> {
        self.rows
            .get(&position)
            .cloned()
            .ok_or_else(|| crate::avl::Error::CorruptIndex(format!("missing memory row {}", position)))
    }

    fn store_node(&mut self, position: i64, index_id: usize, node: Node) -> Result<(), crate::avl::Error> {
        self.rows
            .get_mut(&position)
            .ok_or_else(|| crate::avl::Error::CorruptIndex(format!("missing memory row {}", position)))?
            .set_node(index_id, node);
        Ok(())
    }
}

pub struct MemoryRowStore {
    specs: Vec<IndexSpec>,
    accessors: Vec<i64>,
    rows: HashMap<i64, Row>,
    next_position: i64,
}

impl MemoryRowStore {
    pub fn new(specs: Vec<IndexSpec>) -> Self {
        let accessors = vec![NULL_POS; specs.len()];
        MemoryRowStore {
            specs,
            accessors,
            rows: HashMap::new(),
            next_position: 0,
        }
    }

    fn index(&self, index_id: usize) -> AvlIndex {
        AvlIndex::new(self.specs[index_id].clone())
    }

    fn link_all_indexes(&mut self, position: i64) -> Result<(), Error> {
        for i in 0..self.specs.len() {
            let index = self.index(i);
            let mut src = MemoryNodeSource { rows: &mut self.rows };
            index.insert(&mut src, &mut self.accessors[i], position)?;
        }
        Ok(())
    }

    fn unlink_all_indexes(&mut self, position: i64) -> Result<(), Error> {
        for i in 0..self.specs.len() {
            let index = self.index(i);
            let mut src = MemoryNodeSource { rows: &mut self.rows };
            index.delete(&mut src, &mut self.accessors[i], position)?;
        }
        Ok(())
    }

    /// A genuinely lending cursor over primary-key order, for callers
    /// that want to avoid per-row cloning (the `RowStore::row_iterator`
    /// trait method can't return borrowed rows across variants, since
    /// the disk variant has nothing stable to lend).
    pub fn stream(&self) -> MemoryRowStream<'_> {
        MemoryRowStream {
            store: self,
            index: self.index(0),
            current: NULL_POS,
            started: false,
        }
    }
}

pub struct MemoryRowStream<'a> {
    store: &'a MemoryRowStore,
    index: AvlIndex,
    current: i64,
    started: bool,
}

impl<'a> StreamingIterator for MemoryRowStream<'a> {
    type Item = Row;

    fn advance(&mut self) {
        let mut rows = self.store.rows.clone();
        let mut src = MemoryNodeSource { rows: &mut rows };
        self.current = if !self.started {
            self.started = true;
            self.store
                .index(0)
                .first(&mut src, self.store.accessors[0])
                .unwrap_or(NULL_POS)
        } else if self.current == NULL_POS {
            NULL_POS
        } else {
            self.index.next(&mut src, self.current).unwrap_or(NULL_POS)
        };
    }

    fn get(&self) -> Option<&Row> {
        if self.current == NULL_POS {
            None
        } else {
            self.store.rows.get(&self.current)
        }
    }
}

impl RowStore for MemoryRowStore {
    fn add(&mut self, mut row: Row) -> Result<i64, Error> {
        let position = self.next_position;
        self.next_position += 1;
        row.position = position;
        row.is_in_memory = true;
        row.is_new = false;
        row.nodes = vec![Node::NULL; self.specs.len()];
        self.rows.insert(position, row);
        self.link_all_indexes(position)?;
        Ok(position)
    }

    fn delete(&mut self, position: i64) -> Result<(), Error> {
        self.unlink_all_indexes(position)?;
        self.rows.remove(&position);
        Ok(())
    }

    fn index_row(&mut self, position: i64) -> Result<(), Error> {
        self.link_all_indexes(position)
    }

    fn index_rows(&mut self) -> Result<(), Error> {
        self.accessors = vec![NULL_POS; self.specs.len()];
        let positions: Vec<i64> = self.rows.keys().copied().collect();
        for position in positions {
            self.link_all_indexes(position)?;
        }
        Ok(())
    }

    fn commit_row(&mut self, _position: i64) -> Result<(), Error> {
        Ok(())
    }

    fn rollback_row(&mut self, position: i64, was_insert: bool) -> Result<(), Error> {
        if was_insert {
            self.delete(position)
        } else {
            Ok(())
        }
    }

    fn get(&mut self, position: i64, _keep: bool) -> Result<Arc<Mutex<Row>>, Error> {
        let row = self.rows.get(&position).cloned().ok_or(Error::NotFound(position))?;
        Ok(Arc::new(Mutex::new(row)))
    }

    fn row_iterator(&mut self) -> Result<Box<dyn Iterator<Item = Row> + '_>, Error> {
        let index = self.index(0);
        let mut rows_for_walk = self.rows.clone();
        let mut src = MemoryNodeSource { rows: &mut rows_for_walk };
        let mut pos = index.first(&mut src, self.accessors[0])?;
        let mut ordered = Vec::with_capacity(self.rows.len());
        while pos != NULL_POS {
            ordered.push(self.rows.get(&pos).cloned().ok_or(Error::NotFound(pos))?);
            pos = index.next(&mut src, pos)?;
        }
        Ok(Box::new(ordered.into_iter()))
    }

    fn search_cost(&self, _index_id: usize, op_is_full_scan: bool) -> f64 {
        if op_is_full_scan {
            self.rows.len() as f64
        } else {
            (self.rows.len() as f64).log2().max(1.0)
        }
    }

    fn move_data(&mut self, dest: &mut dyn RowStore, col_map: &[Option<usize>]) -> Result<(), Error> {
        let mut positions: Vec<i64> = self.rows.keys().copied().collect();
        positions.sort();
        for position in positions {
            let src_row = self.rows.get(&position).unwrap().clone();
            let mut fields = Vec::with_capacity(col_map.len());
            for mapping in col_map {
                fields.push(match mapping {
                    Some(src_col) => src_row
                        .fields
                        .get(*src_col)
                        .cloned()
                        .ok_or(Error::ColumnMapMismatch)?,
                    None => crate::value::SqlValue::Null,
                });
            }
            dest.add(Row::new(fields, dest.index_specs().len()))?;
        }
        Ok(())
    }

    fn reindex(&mut self, index_id: usize) -> Result<(), Error> {
        self.accessors[index_id] = NULL_POS;
        let positions: Vec<i64> = self.rows.keys().copied().collect();
        for position in positions {
            let index = self.index(index_id);
            let mut src = MemoryNodeSource { rows: &mut self.rows };
            index.insert(&mut src, &mut self.accessors[index_id], position)?;
        }
        Ok(())
    }

    fn set_accessor(&mut self, index_id: usize, accessor: i64) {
        self.accessors[index_id] = accessor;
    }

    fn accessor(&self, index_id: usize) -> i64 {
        self.accessors[index_id]
    }

    fn index_specs(&self) -> &[IndexSpec] {
        &self.specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SqlValue;

    fn store_with_pk() -> MemoryRowStore {
        MemoryRowStore::new(vec![IndexSpec::simple(0, 0, true)])
    }

    #[test]
    fn add_and_get_roundtrip() {
        let mut store = store_with_pk();
        let pos = store.add(Row::new(vec![SqlValue::Int(5)], 1)).unwrap();
        let row = store.get(pos, false).unwrap();
        assert_eq!(row.lock().unwrap().fields[0], SqlValue::Int(5));
    }

    #[test]
    fn row_iterator_yields_primary_key_order() {
        let mut store = store_with_pk();
        for v in [3, 1, 2] {
            store.add(Row::new(vec![SqlValue::Int(v)], 1)).unwrap();
        }
        let values: Vec<i32> = store
            .row_iterator()
            .unwrap()
            .map(|r| match r.fields[0] {
                SqlValue::Int(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn streaming_cursor_matches_iterator_order() {
        let mut store = store_with_pk();
        for v in [30, 10, 20] {
            store.add(Row::new(vec![SqlValue::Int(v)], 1)).unwrap();
        }
        let mut cursor = store.stream();
        let mut values = Vec::new();
        while let Some(row) = cursor.next() {
            if let SqlValue::Int(v) = row.fields[0] {
                values.push(v);
            }
        }
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn delete_removes_row_and_reindexes() {
        let mut store = store_with_pk();
        let pos = store.add(Row::new(vec![SqlValue::Int(1)], 1)).unwrap();
        store.add(Row::new(vec![SqlValue::Int(2)], 1)).unwrap();
        store.delete(pos).unwrap();
        assert!(store.get(pos, false).is_err());
        let values: Vec<i32> = store
            .row_iterator()
            .unwrap()
            .map(|r| match r.fields[0] {
                SqlValue::Int(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec![2]);
    }
}
