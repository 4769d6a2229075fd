//! Rows and their co-located AVL nodes, plus the row codec. Generalizes
//! the teacher's `record::ValueIterator`/`serial_type` (read-only,
//! SQLite-format, schema-discovered-at-read time) into a schema-typed,
//! writable row with one AVL node per index it participates in.

pub mod codec;
pub mod text;
pub mod textlog;

use crate::avl::NULL_POS;
use crate::value::SqlValue;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown type tag {0} in row image")]
    CorruptRow(u8),
    #[error("row image missing terminator marker")]
    CorruptRowTerminator,
    #[error("non-quotable separator embedded in unquoted text field")]
    TextEncodingError,
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-index AVL node. `parent`/`left`/`right` are row
/// positions (`NULL_POS` for absent); this representation is shared by
/// the memory and disk variants — the difference is only in what a
/// "position" means to the hosting store (an offset on disk, a synthetic
/// counter in memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub parent: i64,
    pub left: i64,
    pub right: i64,
    pub balance: i8,
}

impl Node {
    pub const NULL: Node = Node {
        parent: NULL_POS,
        left: NULL_POS,
        right: NULL_POS,
        balance: 0,
    };
}

impl Default for Node {
    fn default() -> Self {
        Node::NULL
    }
}

/// A row: an ordered tuple of typed values plus one AVL node per index
/// the row participates in.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// File offset of the row image, or -1 if purely in memory /
    /// not yet assigned.
    pub position: i64,
    pub storage_size: u32,
    pub has_data_changed: bool,
    pub has_nodes_changed: bool,
    pub keep_count: u32,
    pub is_in_memory: bool,
    pub is_new: bool,
    pub nodes: Vec<Node>,
    pub fields: Vec<SqlValue>,
}

impl Row {
    pub fn new(fields: Vec<SqlValue>, num_indexes: usize) -> Self {
        Row {
            position: NULL_POS,
            storage_size: 0,
            has_data_changed: true,
            has_nodes_changed: true,
            keep_count: 0,
            is_in_memory: true,
            is_new: true,
            nodes: vec![Node::NULL; num_indexes],
            fields,
        }
    }

    pub fn node(&self, index_id: usize) -> Node {
        self.nodes[index_id]
    }

    pub fn set_node(&mut self, index_id: usize, node: Node) {
        self.nodes[index_id] = node;
        self.has_nodes_changed = true;
    }

    pub fn pin(&mut self) {
        self.keep_count += 1;
    }

    pub fn unpin(&mut self) {
        debug_assert!(self.keep_count > 0, "keepCount must stay non-negative");
        if self.keep_count > 0 {
            self.keep_count -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_row_has_null_nodes() {
        let r = Row::new(vec![SqlValue::Int(1)], 2);
        assert_eq!(r.nodes.len(), 2);
        assert_eq!(r.nodes[0], Node::NULL);
        assert_eq!(r.position, NULL_POS);
    }

    #[test]
    fn keep_count_never_goes_negative() {
        let mut r = Row::new(vec![], 0);
        r.unpin();
        assert_eq!(r.keep_count, 0);
    }
}
