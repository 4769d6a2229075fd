//! The AVL insert/delete/cursor algorithm, parametrized over
//! `NodeSource` so it runs unchanged whether nodes live in a memory
//! store or behind the disk cache. Grounded on the teacher's b-tree
//! cursor shape (`btree::table::TableIterator` walking cell-to-cell by
//! position) for the `next`/`last` traversal, with the insert/delete
//! bodies following the standard AVL retracing recipe (balance factors
//! in `{-1,0,+1}`, single/double rotation selection by the child's
//! balance sign).

use super::{compare_for_tree, Error, IndexSpec, NodeSource, NULL_POS};
use crate::row::{Node, Row};
use std::cmp::Ordering;

pub struct AvlIndex {
    pub spec: IndexSpec,
}

impl AvlIndex {
    pub fn new(spec: IndexSpec) -> Self {
        AvlIndex { spec }
    }

    fn node_of(&self, row: &Row) -> Node {
        row.node(self.spec.id)
    }

    fn set_node(
        &self,
        src: &mut dyn NodeSource,
        position: i64,
        node: Node,
    ) -> Result<(), Error> {
        src.store_node(position, self.spec.id, node)
    }

    /// Inserts `row_position`'s row into the tree rooted at `*accessor`,
    /// updating `*accessor` if the root changes. Returns `DuplicateKey` if
    /// `spec.unique` and an equal key already exists.
    pub fn insert(
        &self,
        src: &mut dyn NodeSource,
        accessor: &mut i64,
        row_position: i64,
    ) -> Result<(), Error> {
        if *accessor == NULL_POS {
            *accessor = row_position;
            self.set_node(src, row_position, Node::NULL)?;
            return Ok(());
        }

        let new_row = src.fetch_row(row_position)?;
        let mut path: Vec<(i64, bool)> = Vec::new(); // (ancestor position, went_left)
        let mut cur = *accessor;
        loop {
            let cur_row = src.fetch_row(cur)?;
            let ord = compare_for_tree(&new_row, &cur_row, &self.spec);
            let went_left = match ord {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => {
                    if self.spec.unique {
                        return Err(Error::DuplicateKey);
                    }
                    // Non-unique ties are already broken on row position by
                    // compare_for_tree, so Equal here cannot occur; keep a
                    // defined direction regardless.
                    new_row.position < cur_row.position
                }
            };
            let cur_node = self.node_of(&cur_row);
            let child = if went_left { cur_node.left } else { cur_node.right };
            path.push((cur, went_left));
            if child == NULL_POS {
                let mut leaf = Node::NULL;
                leaf.parent = cur;
                self.set_node(src, row_position, leaf)?;
                let mut parent_node = cur_node;
                if went_left {
                    parent_node.left = row_position;
                } else {
                    parent_node.right = row_position;
                }
                self.set_node(src, cur, parent_node)?;
                break;
            }
            cur = child;
        }

        self.retrace_after_insert(src, accessor, &path)
    }

    fn retrace_after_insert(
        &self,
        src: &mut dyn NodeSource,
        accessor: &mut i64,
        path: &[(i64, bool)],
    ) -> Result<(), Error> {
        // Walk from the newly attached leaf's parent back toward the root,
        // adjusting balance factors until a rotation absorbs the height
        // change or the root is reached (standard AVL retrace).
        for &(pos, went_left) in path.iter().rev() {
            let mut node = self.fetch_node(src, pos)?;
            let delta: i8 = if went_left { -1 } else { 1 };
            node.balance += delta;
            match node.balance {
                0 => {
                    self.set_node(src, pos, node)?;
                    return Ok(());
                }
                -1 | 1 => {
                    self.set_node(src, pos, node)?;
                    continue;
                }
                _ => {
                    self.rebalance(src, accessor, pos, node)?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn fetch_node(&self, src: &mut dyn NodeSource, position: i64) -> Result<Node, Error> {
        Ok(self.node_of(&src.fetch_row(position)?))
    }

    /// `node` is out of balance (`balance` in `{-2,2}`); selects and
    /// performs the appropriate single or double rotation, then links the
    /// resulting subtree root back into `node`'s former parent (or
    /// `*accessor` if `node` was the root).
    fn rebalance(
        &self,
        src: &mut dyn NodeSource,
        accessor: &mut i64,
        pos: i64,
        node: Node,
    ) -> Result<(), Error> {
        let parent = node.parent;
        let new_root = if node.balance == 2 {
            let right = self.fetch_node(src, node.right)?;
            if right.balance >= 0 {
                self.rotate_left(src, pos, node)?
            } else {
                self.rotate_right_left(src, pos, node)?
            }
        } else {
            let left = self.fetch_node(src, node.left)?;
            if left.balance <= 0 {
                self.rotate_right(src, pos, node)?
            } else {
                self.rotate_left_right(src, pos, node)?
            }
        };
        self.relink_parent(src, accessor, parent, pos, new_root)
    }

    fn relink_parent(
        &self,
        src: &mut dyn NodeSource,
        accessor: &mut i64,
        parent: i64,
        old_child: i64,
        new_child: i64,
    ) -> Result<(), Error> {
        let mut new_node = self.fetch_node(src, new_child)?;
        new_node.parent = parent;
        self.set_node(src, new_child, new_node)?;
        if parent == NULL_POS {
            *accessor = new_child;
        } else {
            let mut parent_node = self.fetch_node(src, parent)?;
            if parent_node.left == old_child {
                parent_node.left = new_child;
            } else {
                parent_node.right = new_child;
            }
            self.set_node(src, parent, parent_node)?;
        }
        Ok(())
    }

    /// LL case: `pos` is left-heavy at its left child.
    fn rotate_right(&self, src: &mut dyn NodeSource, pos: i64, mut node: Node) -> Result<i64, Error> {
        let left_pos = node.left;
        let mut left = self.fetch_node(src, left_pos)?;

        node.left = left.right;
        if left.right != NULL_POS {
            let mut lr = self.fetch_node(src, left.right)?;
            lr.parent = pos;
            self.set_node(src, left.right, lr)?;
        }
        left.right = pos;
        node.parent = left_pos;

        if left.balance == 0 {
            node.balance = -1;
            left.balance = 1;
        } else {
            node.balance = 0;
            left.balance = 0;
        }

        self.set_node(src, pos, node)?;
        self.set_node(src, left_pos, left)?;
        Ok(left_pos)
    }

    /// RR case: mirror of `rotate_right`.
    fn rotate_left(&self, src: &mut dyn NodeSource, pos: i64, mut node: Node) -> Result<i64, Error> {
        let right_pos = node.right;
        let mut right = self.fetch_node(src, right_pos)?;

        node.right = right.left;
        if right.left != NULL_POS {
            let mut rl = self.fetch_node(src, right.left)?;
            rl.parent = pos;
            self.set_node(src, right.left, rl)?;
        }
        right.left = pos;
        node.parent = right_pos;

        if right.balance == 0 {
            node.balance = 1;
            right.balance = -1;
        } else {
            node.balance = 0;
            right.balance = 0;
        }

        self.set_node(src, pos, node)?;
        self.set_node(src, right_pos, right)?;
        Ok(right_pos)
    }

    /// LR case: rotate `pos.left` left, then rotate `pos` right.
    fn rotate_left_right(&self, src: &mut dyn NodeSource, pos: i64, node: Node) -> Result<i64, Error> {
        let left_pos = node.left;
        let left = self.fetch_node(src, left_pos)?;
        let pivot_pos = left.right;
        let pivot = self.fetch_node(src, pivot_pos)?;
        let pivot_balance = pivot.balance;

        let new_left = self.rotate_left(src, left_pos, left)?;
        debug_assert_eq!(new_left, pivot_pos);
        let mut node = self.fetch_node(src, pos)?;
        node.left = pivot_pos;
        self.set_node(src, pos, node)?;
        let new_root = self.rotate_right(src, pos, self.fetch_node(src, pos)?)?;

        // rotate_right/rotate_left already derive balances from the
        // rotated-into node; for the double-rotation case the original
        // pivot's balance decides the final split, per the standard
        // LR/RL recipe.
        let mut root_node = self.fetch_node(src, new_root)?;
        let mut left_child = self.fetch_node(src, root_node.left)?;
        let mut right_child = self.fetch_node(src, root_node.right)?;
        match pivot_balance {
            -1 => {
                left_child.balance = 0;
                right_child.balance = 1;
            }
            1 => {
                left_child.balance = -1;
                right_child.balance = 0;
            }
            _ => {
                left_child.balance = 0;
                right_child.balance = 0;
            }
        }
        root_node.balance = 0;
        self.set_node(src, new_root, root_node)?;
        self.set_node(src, root_node.left, left_child)?;
        self.set_node(src, root_node.right, right_child)?;
        Ok(new_root)
    }

    /// RL case: mirror of `rotate_left_right`.
    fn rotate_right_left(&self, src: &mut dyn NodeSource, pos: i64, node: Node) -> Result<i64, Error> {
        let right_pos = node.right;
        let right = self.fetch_node(src, right_pos)?;
        let pivot_pos = right.left;
        let pivot = self.fetch_node(src, pivot_pos)?;
        let pivot_balance = pivot.balance;

        let new_right = self.rotate_right(src, right_pos, right)?;
        debug_assert_eq!(new_right, pivot_pos);
        let mut node = self.fetch_node(src, pos)?;
        node.right = pivot_pos;
        self.set_node(src, pos, node)?;
        let new_root = self.rotate_left(src, pos, self.fetch_node(src, pos)?)?;

        let mut root_node = self.fetch_node(src, new_root)?;
        let mut left_child = self.fetch_node(src, root_node.left)?;
        let mut right_child = self.fetch_node(src, root_node.right)?;
        match pivot_balance {
            1 => {
                left_child.balance = -1;
                right_child.balance = 0;
            }
            -1 => {
                left_child.balance = 0;
                right_child.balance = 1;
            }
            _ => {
                left_child.balance = 0;
                right_child.balance = 0;
            }
        }
        root_node.balance = 0;
        self.set_node(src, new_root, root_node)?;
        self.set_node(src, root_node.left, left_child)?;
        self.set_node(src, root_node.right, right_child)?;
        Ok(new_root)
    }

    /// Removes `row_position` from the tree rooted at `*accessor`. If the
    /// node has two children, splices in its in-order predecessor to take
    /// its place, preserving the removed row's own identity (the
    /// predecessor row moves to the deleted slot's position in the tree,
    /// not the other way around).
    pub fn delete(
        &self,
        src: &mut dyn NodeSource,
        accessor: &mut i64,
        row_position: i64,
    ) -> Result<(), Error> {
        let node = self.fetch_node(src, row_position)?;

        let (splice_pos, removed_child_slot_parent, removed_was_left) = if node.left != NULL_POS
            && node.right != NULL_POS
        {
            // Find in-order predecessor: rightmost node of the left subtree.
            let mut pred_pos = node.left;
            loop {
                let pred = self.fetch_node(src, pred_pos)?;
                if pred.right == NULL_POS {
                    break;
                }
                pred_pos = pred.right;
            }
            let pred = self.fetch_node(src, pred_pos)?;

            // Detach the predecessor from its current slot first.
            let pred_parent = pred.parent;
            let pred_left_child = pred.left;
            if pred_left_child != NULL_POS {
                let mut c = self.fetch_node(src, pred_left_child)?;
                c.parent = pred_parent;
                self.set_node(src, pred_left_child, c)?;
            }
            let was_left_of_pred_parent = if pred_parent == row_position {
                true // predecessor is node.left itself
            } else {
                // The walk only ever continues via `.right`, so whenever
                // the predecessor isn't `node.left` itself, it is its
                // parent's right child.
                let mut pp = self.fetch_node(src, pred_parent)?;
                pp.right = pred_left_child;
                self.set_node(src, pred_parent, pp)?;
                false
            };

            // Move the predecessor into the deleted node's slot, inheriting
            // the deleted node's balance and right subtree. Its left
            // subtree is either its own prior left child (if it was
            // `node.left` itself) or `node.left` wholesale (if it was
            // found deeper in that subtree).
            let new_left = if was_left_of_pred_parent {
                pred_left_child
            } else {
                node.left
            };
            let pred_node = Node {
                parent: node.parent,
                left: new_left,
                right: node.right,
                balance: node.balance,
            };
            self.set_node(src, pred_pos, pred_node)?;
            if new_left != NULL_POS {
                let mut l = self.fetch_node(src, new_left)?;
                l.parent = pred_pos;
                self.set_node(src, new_left, l)?;
            }
            if node.right != NULL_POS {
                let mut r = self.fetch_node(src, node.right)?;
                r.parent = pred_pos;
                self.set_node(src, node.right, r)?;
            }
            if node.parent != NULL_POS {
                let mut gp = self.fetch_node(src, node.parent)?;
                if gp.left == row_position {
                    gp.left = pred_pos;
                } else {
                    gp.right = pred_pos;
                }
                self.set_node(src, node.parent, gp)?;
            } else {
                *accessor = pred_pos;
            }

            // The subtree that actually shrank by one level is wherever
            // the predecessor used to be: its own left child's slot, if
            // it was `node.left` directly (went_left from pred_pos
            // itself), or the right slot of its old parent otherwise.
            let retrace_from = if was_left_of_pred_parent { pred_pos } else { pred_parent };
            (pred_pos, retrace_from, was_left_of_pred_parent)
        } else {
            (row_position, node.parent, node.left == NULL_POS && node.right != NULL_POS)
        };

        if splice_pos != row_position {
            // Two-child case already handled above: replace the
            // now-vacated predecessor subtree position with nothing
            // (it had at most a left child, already spliced out) and
            // retrace from its old parent.
            self.retrace_after_delete(src, accessor, removed_child_slot_parent, removed_was_left)?;
            return Ok(());
        }

        // Zero- or one-child case: replace `node` with its single child
        // (or null) directly in its parent.
        let replacement = if node.left != NULL_POS {
            node.left
        } else {
            node.right
        };
        let parent = node.parent;
        if replacement != NULL_POS {
            let mut r = self.fetch_node(src, replacement)?;
            r.parent = parent;
            self.set_node(src, replacement, r)?;
        }
        let went_left = if parent != NULL_POS {
            let mut p = self.fetch_node(src, parent)?;
            let was_left = p.left == row_position;
            if was_left {
                p.left = replacement;
            } else {
                p.right = replacement;
            }
            self.set_node(src, parent, p)?;
            was_left
        } else {
            *accessor = replacement;
            false
        };

        if parent != NULL_POS {
            self.retrace_after_delete(src, accessor, parent, went_left)?;
        }
        Ok(())
    }

    /// Retraces upward from `from` (the parent of the slot that just
    /// shrank on the `from_left` side), rebalancing as needed. Unlike
    /// insertion, a deletion retrace does not necessarily stop at the
    /// first absorbed rotation: a rotation can still shrink the subtree
    /// height, so the walk continues to the root.
    fn retrace_after_delete(
        &self,
        src: &mut dyn NodeSource,
        accessor: &mut i64,
        from: i64,
        from_left: bool,
    ) -> Result<(), Error> {
        let mut pos = from;
        let mut went_left = from_left;
        loop {
            if pos == NULL_POS {
                return Ok(());
            }
            let mut node = self.fetch_node(src, pos)?;
            let delta: i8 = if went_left { 1 } else { -1 };
            node.balance += delta;
            let parent = node.parent;
            let was_left_of_parent = if parent != NULL_POS {
                self.fetch_node(src, parent)?.left == pos
            } else {
                false
            };

            match node.balance {
                -1 | 1 => {
                    self.set_node(src, pos, node)?;
                    return Ok(());
                }
                0 => {
                    self.set_node(src, pos, node)?;
                    pos = parent;
                    went_left = was_left_of_parent;
                    continue;
                }
                _ => {
                    let height_unchanged = {
                        let heavy_child_pos = if node.balance == 2 { node.right } else { node.left };
                        self.fetch_node(src, heavy_child_pos)?.balance == 0
                    };
                    self.rebalance(src, accessor, pos, node)?;
                    if height_unchanged {
                        return Ok(());
                    }
                    pos = parent;
                    went_left = was_left_of_parent;
                    continue;
                }
            }
        }
    }

    /// In-order successor of `row_position` within the tree, or
    /// `NULL_POS` if it is the last entry.
    pub fn next(&self, src: &mut dyn NodeSource, row_position: i64) -> Result<i64, Error> {
        let node = self.fetch_node(src, row_position)?;
        if node.right != NULL_POS {
            let mut pos = node.right;
            loop {
                let n = self.fetch_node(src, pos)?;
                if n.left == NULL_POS {
                    return Ok(pos);
                }
                pos = n.left;
            }
        }
        let mut child = row_position;
        let mut parent = node.parent;
        loop {
            if parent == NULL_POS {
                return Ok(NULL_POS);
            }
            let p = self.fetch_node(src, parent)?;
            if p.left == child {
                return Ok(parent);
            }
            child = parent;
            parent = p.parent;
        }
    }

    /// In-order predecessor, symmetric to `next`.
    pub fn last(&self, src: &mut dyn NodeSource, row_position: i64) -> Result<i64, Error> {
        let node = self.fetch_node(src, row_position)?;
        if node.left != NULL_POS {
            let mut pos = node.left;
            loop {
                let n = self.fetch_node(src, pos)?;
                if n.right == NULL_POS {
                    return Ok(pos);
                }
                pos = n.right;
            }
        }
        let mut child = row_position;
        let mut parent = node.parent;
        loop {
            if parent == NULL_POS {
                return Ok(NULL_POS);
            }
            let p = self.fetch_node(src, parent)?;
            if p.right == child {
                return Ok(parent);
            }
            child = parent;
            parent = p.parent;
        }
    }

    /// Leftmost (first, in index order) entry of the tree rooted at
    /// `accessor`.
    pub fn first(&self, src: &mut dyn NodeSource, accessor: i64) -> Result<i64, Error> {
        if accessor == NULL_POS {
            return Ok(NULL_POS);
        }
        let mut pos = accessor;
        loop {
            let n = self.fetch_node(src, pos)?;
            if n.left == NULL_POS {
                return Ok(pos);
            }
            pos = n.left;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avl::IndexSpec;
    use crate::value::SqlValue;
    use std::collections::HashMap;

    /// An in-memory `NodeSource` keyed by synthetic positions, for
    /// exercising the AVL algorithm without a real store.
    struct MemSource {
        rows: HashMap<i64, Row>,
    }

    impl MemSource {
        fn new() -> Self {
            MemSource {
                rows: HashMap::new(),
            }
        }

        fn insert_value(&mut self, position: i64, value: i32) {
            let mut row = Row::new(vec![SqlValue::Int(value)], 1);
            row.position = position;
            self.rows.insert(position, row);
        }

        fn in_order(&mut self, index: &AvlIndex, accessor: i64) -> Vec<i32> {
            let mut out = Vec::new();
            let mut pos = index.first(self, accessor).unwrap();
            while pos != NULL_POS {
                if let SqlValue::Int(v) = self.rows[&pos].fields[0] {
                    out.push(v);
                }
                pos = index.next(self, pos).unwrap();
            }
            out
        }

        fn height_balanced(&mut self, pos: i64) -> (i32, bool) {
            if pos == NULL_POS {
                return (0, true);
            }
            let node = self.rows[&pos].node(0);
            let (lh, lb) = self.height_balanced(node.left);
            let (rh, rb) = self.height_balanced(node.right);
            let balance = rh - lh;
            let ok = lb && rb && balance.abs() <= 1 && balance as i8 == node.balance;
            (lh.max(rh) + 1, ok)
        }
    }

    impl NodeSource for MemSource {
        fn fetch_row(&mut self, position: i64) -> Result<Row, Error> {
            self.rows
                .get(&position)
                .cloned()
                .ok_or_else(|| Error::CorruptIndex(format!("missing row {}", position)))
        }

        fn store_node(&mut self, position: i64, index_id: usize, node: Node) -> Result<(), Error> {
            self.rows.get_mut(&position).unwrap().set_node(index_id, node);
            Ok(())
        }
    }

    #[test]
    fn insert_ascending_stays_balanced_and_sorted() {
        let spec = IndexSpec::simple(0, 0, true);
        let index = AvlIndex::new(spec);
        let mut src = MemSource::new();
        let mut accessor = NULL_POS;
        for i in 0..31 {
            src.insert_value(i, i as i32);
            index.insert(&mut src, &mut accessor, i).unwrap();
        }
        assert_eq!(src.in_order(&index, accessor), (0..31).collect::<Vec<_>>());
        let (_, balanced) = src.height_balanced(accessor);
        assert!(balanced, "tree must stay AVL-balanced after ascending inserts");
    }

    #[test]
    fn insert_descending_stays_balanced_and_sorted() {
        let spec = IndexSpec::simple(0, 0, true);
        let index = AvlIndex::new(spec);
        let mut src = MemSource::new();
        let mut accessor = NULL_POS;
        for i in (0..31).rev() {
            src.insert_value(i, i as i32);
            index.insert(&mut src, &mut accessor, i).unwrap();
        }
        assert_eq!(src.in_order(&index, accessor), (0..31).collect::<Vec<_>>());
        let (_, balanced) = src.height_balanced(accessor);
        assert!(balanced);
    }

    #[test]
    fn duplicate_key_rejected_on_unique_index() {
        let spec = IndexSpec::simple(0, 0, true);
        let index = AvlIndex::new(spec);
        let mut src = MemSource::new();
        let mut accessor = NULL_POS;
        src.insert_value(0, 5);
        index.insert(&mut src, &mut accessor, 0).unwrap();
        src.insert_value(1, 5);
        assert!(matches!(
            index.insert(&mut src, &mut accessor, 1),
            Err(Error::DuplicateKey)
        ));
    }

    #[test]
    fn delete_leaf_keeps_order_and_balance() {
        let spec = IndexSpec::simple(0, 0, true);
        let index = AvlIndex::new(spec);
        let mut src = MemSource::new();
        let mut accessor = NULL_POS;
        for i in 0..15 {
            src.insert_value(i, i as i32);
            index.insert(&mut src, &mut accessor, i).unwrap();
        }
        index.delete(&mut src, &mut accessor, 14).unwrap();
        let expected: Vec<i32> = (0..14).collect();
        assert_eq!(src.in_order(&index, accessor), expected);
        let (_, balanced) = src.height_balanced(accessor);
        assert!(balanced);
    }

    #[test]
    fn delete_node_with_two_children_uses_predecessor() {
        let spec = IndexSpec::simple(0, 0, true);
        let index = AvlIndex::new(spec);
        let mut src = MemSource::new();
        let mut accessor = NULL_POS;
        for (i, v) in [(0i64, 50), (1, 25), (2, 75), (3, 10), (4, 30)] {
            src.insert_value(i, v);
            index.insert(&mut src, &mut accessor, i).unwrap();
        }
        index.delete(&mut src, &mut accessor, 1).unwrap(); // delete value 25, has two children
        assert_eq!(src.in_order(&index, accessor), vec![10, 30, 50, 75]);
        let (_, balanced) = src.height_balanced(accessor);
        assert!(balanced);
    }

    #[test]
    fn random_insert_delete_sequence_stays_balanced() {
        let spec = IndexSpec::simple(0, 0, true);
        let index = AvlIndex::new(spec);
        let mut src = MemSource::new();
        let mut accessor = NULL_POS;
        let values: Vec<i32> = vec![
            44, 17, 62, 5, 23, 51, 77, 2, 9, 19, 30, 48, 54, 70, 81, 1, 3, 6, 11,
        ];
        for (i, &v) in values.iter().enumerate() {
            src.insert_value(i as i64, v);
            index.insert(&mut src, &mut accessor, i as i64).unwrap();
        }
        let (_, balanced) = src.height_balanced(accessor);
        assert!(balanced);

        for i in [0i64, 5, 10, 15] {
            index.delete(&mut src, &mut accessor, i).unwrap();
            let (_, balanced) = src.height_balanced(accessor);
            assert!(balanced, "unbalanced after deleting index {}", i);
        }
        let mut remaining: Vec<i32> = values
            .iter()
            .enumerate()
            .filter(|(i, _)| ![0usize, 5, 10, 15].contains(i))
            .map(|(_, &v)| v)
            .collect();
        remaining.sort();
        assert_eq!(src.in_order(&index, accessor), remaining);
    }
}
