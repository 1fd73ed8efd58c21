//! Ordered key-to-value index: a B*-tree with B+-leaf semantics.
//!
//! Values live only in leaves; internal nodes carry separator keys and
//! child pointers, and every separator equals the leftmost key of its
//! right subtree's leaf. Non-root nodes are kept two-thirds full: a full
//! node on the insert descent is first redistributed with a sibling
//! (right, then left), then triple-split into three nodes, and only a
//! node with no siblings is split in half. Erase borrows from a sibling,
//! merges pairwise when the result fits, and otherwise pools three
//! siblings into two (or back into three, balanced). Children of the
//! root live in a relaxed band; they are brought up to the fill bound
//! when the root grows and they move a level down.

use thiserror::Error;

use crate::error::{Result, VfsError};

/// Invariant violation reported by [`BStarTree::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexViolation {
    #[error("node holds {found} keys, above the branching factor {max}")]
    Overflow { found: usize, max: usize },
    #[error("node holds {found} keys, below the minimum fill {min}")]
    Underflow { found: usize, min: usize },
    #[error("internal node has {children} children for {keys} keys")]
    Arity { keys: usize, children: usize },
    #[error("leaf holds {values} values for {keys} keys")]
    ValueParity { keys: usize, values: usize },
    #[error("keys out of order within a node")]
    KeyOrder,
    #[error("separator does not match the leftmost key of its right subtree")]
    SeparatorMismatch,
    #[error("leaves sit at unequal depths")]
    LeafDepth,
}

struct Node<K, V> {
    leaf: bool,
    keys: Vec<K>,
    /// Parallel to `keys`; populated in leaves only.
    values: Vec<V>,
    /// `keys.len() + 1` entries; internal nodes only.
    children: Vec<Box<Node<K, V>>>,
}

impl<K, V> Node<K, V> {
    fn new_leaf() -> Self {
        Node {
            leaf: true,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    fn new_internal() -> Self {
        Node {
            leaf: false,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }
}

pub struct BStarTree<K, V> {
    root: Box<Node<K, V>>,
    branching: usize,
    len: usize,
}

impl<K: Ord + Clone, V> BStarTree<K, V> {
    /// `branching` is the maximum number of keys a node may hold.
    pub fn new(branching: usize) -> Result<Self> {
        if branching < 3 {
            return Err(VfsError::InvalidArg(
                "branching factor must be at least 3".into(),
            ));
        }
        Ok(BStarTree {
            root: Box::new(Node::new_leaf()),
            branching,
            len: 0,
        })
    }

    pub fn branching(&self) -> usize {
        self.branching
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.root = Box::new(Node::new_leaf());
        self.len = 0;
    }

    /// Two-thirds minimum fill for nodes below the root's children. This
    /// is the largest bound every rebalance step stays closed under.
    fn min_fill(&self) -> usize {
        (2 * self.branching - 2) / 3
    }

    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = self.root.as_ref();
        loop {
            match node.keys.binary_search_by(|k| k.borrow().cmp(key)) {
                Ok(i) => {
                    if node.leaf {
                        return Some(&node.values[i]);
                    }
                    // equal keys descend right
                    node = node.children[i + 1].as_ref();
                }
                Err(i) => {
                    if node.leaf {
                        return None;
                    }
                    node = node.children[i].as_ref();
                }
            }
        }
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::get_mut_rec(&mut self.root, key)
    }

    fn get_mut_rec<'a, Q>(node: &'a mut Node<K, V>, key: &Q) -> Option<&'a mut V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match node.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(i) => {
                if node.leaf {
                    Some(&mut node.values[i])
                } else {
                    Self::get_mut_rec(&mut node.children[i + 1], key)
                }
            }
            Err(i) => {
                if node.leaf {
                    None
                } else {
                    Self::get_mut_rec(&mut node.children[i], key)
                }
            }
        }
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find(key).is_some()
    }

    /// Insert `key` or update its value in place.
    pub fn insert(&mut self, key: K, value: V) {
        let m = self.branching;
        let minf = self.min_fill();
        if self.root.keys.len() >= m {
            // The root's children are about to move a level down, out of
            // the relaxed band; bring stragglers up to the fill bound
            // first. Merges may free enough room in the root to make the
            // growth unnecessary.
            let mut i = 0;
            while self.root.keys.len() >= m && i < self.root.children.len() {
                let child_len = self.root.children[i].keys.len();
                if child_len < minf {
                    let width = self.root.children.len();
                    Self::repair_child(&mut self.root, i, false, m, minf);
                    let stuck = self.root.children.len() == width
                        && i < self.root.children.len()
                        && self.root.children[i].keys.len() == child_len;
                    if stuck {
                        i += 1;
                    }
                } else {
                    i += 1;
                }
            }
            while !self.root.leaf && self.root.keys.is_empty() {
                match self.root.children.pop() {
                    Some(only) => self.root = only,
                    None => break,
                }
            }
        }
        if self.root.keys.len() >= m {
            let old_root = std::mem::replace(&mut self.root, Box::new(Node::new_internal()));
            self.root.children.push(old_root);
            Self::rebalance_full_child(&mut self.root, 0, &key, m, minf);
        }
        if Self::insert_non_full(&mut self.root, key, value, m, minf) {
            self.len += 1;
        }
    }

    fn insert_non_full(node: &mut Node<K, V>, key: K, value: V, m: usize, minf: usize) -> bool {
        if node.leaf {
            return match node.keys.binary_search(&key) {
                Ok(i) => {
                    node.values[i] = value;
                    false
                }
                Err(i) => {
                    node.keys.insert(i, key);
                    node.values.insert(i, value);
                    true
                }
            };
        }
        let mut ci = Self::descend_index(node, &key);
        if node.children[ci].keys.len() >= m {
            Self::rebalance_full_child(node, ci, &key, m, minf);
            // separators changed; pick the branch again
            ci = Self::descend_index(node, &key);
        }
        Self::insert_non_full(&mut node.children[ci], key, value, m, minf)
    }

    fn descend_index(node: &Node<K, V>, key: &K) -> usize {
        match node.keys.binary_search(key) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Make room in the full child at `idx`: redistribute with the right
    /// then left sibling, triple-split right then left, and as the last
    /// resort (a child with no siblings) split in half.
    fn rebalance_full_child(parent: &mut Node<K, V>, idx: usize, pending: &K, m: usize, minf: usize) {
        let width = parent.children.len();
        if idx + 1 < width && Self::try_share(parent, idx, pending, m, minf) {
            return;
        }
        if idx > 0 && Self::try_share(parent, idx - 1, pending, m, minf) {
            return;
        }
        if idx + 1 < width && Self::try_triple_split(parent, idx, m) {
            return;
        }
        if idx > 0 && Self::try_triple_split(parent, idx - 1, m) {
            return;
        }
        Self::split_child(parent, idx);
    }

    /// Redistribute the pair `(li, li + 1)` so that the branch the
    /// pending key descends into ends below capacity. Fails on a full
    /// pair, on too few keys to reach the fill bound on both sides, and
    /// in the one corner where no split point can give the key room.
    fn try_share(parent: &mut Node<K, V>, li: usize, pending: &K, m: usize, minf: usize) -> bool {
        let lk = parent.children[li].keys.len();
        let rk = parent.children[li + 1].keys.len();
        if lk >= m && rk >= m {
            return false;
        }
        let d = lk + rk;
        if d < 2 * minf {
            return false;
        }

        let leaf = parent.children[li].leaf;
        let target = {
            let left = &parent.children[li].keys;
            let right = &parent.children[li + 1].keys;
            let separator = if leaf { None } else { Some(&parent.keys[li]) };
            let balanced = d / 2;
            if pending < Self::pool_key_at(left, separator, right, balanced) {
                balanced
            } else if d - balanced <= m - 1 {
                balanced
            } else if pending >= Self::pool_key_at(left, separator, right, balanced + 1) {
                balanced + 1
            } else {
                return false;
            }
        };

        let (head, tail) = parent.children.split_at_mut(li + 1);
        let left = &mut *head[li];
        let right = &mut *tail[0];
        if leaf {
            let mut keys = std::mem::take(&mut left.keys);
            keys.append(&mut right.keys);
            let mut values = std::mem::take(&mut left.values);
            values.append(&mut right.values);
            let right_keys = keys.split_off(target);
            let right_values = values.split_off(target);
            parent.keys[li] = right_keys[0].clone();
            left.keys = keys;
            left.values = values;
            right.keys = right_keys;
            right.values = right_values;
        } else {
            let mut keys = std::mem::take(&mut left.keys);
            keys.push(parent.keys[li].clone());
            keys.append(&mut right.keys);
            let mut children = std::mem::take(&mut left.children);
            children.append(&mut right.children);
            let mut right_keys = keys.split_off(target);
            let separator = right_keys.remove(0);
            let right_children = children.split_off(target + 1);
            parent.keys[li] = separator;
            left.keys = keys;
            left.children = children;
            right.keys = right_keys;
            right.children = right_children;
        }
        true
    }

    /// `i`-th key of the sequence `left ++ separator? ++ right`.
    fn pool_key_at<'a>(
        left: &'a [K],
        separator: Option<&'a K>,
        right: &'a [K],
        i: usize,
    ) -> &'a K {
        if i < left.len() {
            &left[i]
        } else if let Some(sep) = separator {
            if i == left.len() {
                sep
            } else {
                &right[i - left.len() - 1]
            }
        } else {
            &right[i - left.len()]
        }
    }

    /// Pool the pair `(li, li + 1)` plus the separator and split into
    /// three nodes of near-equal size. Legal once the pair cannot be
    /// redistributed, i.e. from one key short of full upward.
    fn try_triple_split(parent: &mut Node<K, V>, li: usize, m: usize) -> bool {
        let lk = parent.children[li].keys.len();
        let rk = parent.children[li + 1].keys.len();
        if lk + rk < 2 * m - 1 {
            return false;
        }
        let leaf = parent.children[li].leaf;
        if leaf {
            let (mid_first, third) = {
                let (head, tail) = parent.children.split_at_mut(li + 1);
                let first = &mut *head[li];
                let second = &mut *tail[0];
                let mut keys = std::mem::take(&mut first.keys);
                keys.append(&mut second.keys);
                let mut values = std::mem::take(&mut first.values);
                values.append(&mut second.values);
                let total = keys.len();
                let q = total / 3;
                let r = total % 3;
                let (s1, s2) = (q + usize::from(r > 0), q + usize::from(r > 1));
                let mut rest_keys = keys.split_off(s1);
                let mut rest_values = values.split_off(s1);
                let third_keys = rest_keys.split_off(s2);
                let third_values = rest_values.split_off(s2);
                first.keys = keys;
                first.values = values;
                second.keys = rest_keys;
                second.values = rest_values;
                let third = Node {
                    leaf: true,
                    keys: third_keys,
                    values: third_values,
                    children: Vec::new(),
                };
                (second.keys[0].clone(), third)
            };
            parent.keys[li] = mid_first;
            parent.keys.insert(li + 1, third.keys[0].clone());
            parent.children.insert(li + 2, Box::new(third));
        } else {
            let (up1, up2, third) = {
                let (head, tail) = parent.children.split_at_mut(li + 1);
                let first = &mut *head[li];
                let second = &mut *tail[0];
                let mut keys = std::mem::take(&mut first.keys);
                keys.push(parent.keys[li].clone());
                keys.append(&mut second.keys);
                let mut children = std::mem::take(&mut first.children);
                children.append(&mut second.children);
                let spread = keys.len() - 2;
                let q = spread / 3;
                let r = spread % 3;
                let (k1, k2) = (q + usize::from(r > 0), q + usize::from(r > 1));
                let mut rest_keys = keys.split_off(k1);
                let up1 = rest_keys.remove(0);
                let mut third_keys = rest_keys.split_off(k2);
                let up2 = third_keys.remove(0);
                let mut rest_children = children.split_off(k1 + 1);
                let third_children = rest_children.split_off(k2 + 1);
                first.keys = keys;
                first.children = children;
                second.keys = rest_keys;
                second.children = rest_children;
                let third = Node {
                    leaf: false,
                    keys: third_keys,
                    values: Vec::new(),
                    children: third_children,
                };
                (up1, up2, third)
            };
            parent.keys[li] = up1;
            parent.keys.insert(li + 1, up2);
            parent.children.insert(li + 2, Box::new(third));
        }
        true
    }

    /// Halve the child at `idx`. Only reached for a child with no
    /// sibling, i.e. directly under a freshly grown root.
    fn split_child(parent: &mut Node<K, V>, idx: usize) {
        let (new_node, separator) = {
            let child = &mut *parent.children[idx];
            let mid = child.keys.len() / 2;
            if child.leaf {
                let keys = child.keys.split_off(mid);
                let values = child.values.split_off(mid);
                let separator = keys[0].clone();
                (
                    Node {
                        leaf: true,
                        keys,
                        values,
                        children: Vec::new(),
                    },
                    separator,
                )
            } else {
                let mut keys = child.keys.split_off(mid);
                let separator = keys.remove(0);
                let children = child.children.split_off(mid + 1);
                (
                    Node {
                        leaf: false,
                        keys,
                        values: Vec::new(),
                        children,
                    },
                    separator,
                )
            }
        };
        parent.keys.insert(idx, separator);
        parent.children.insert(idx + 1, Box::new(new_node));
    }

    /// Erase `key`, returning whether it was present.
    pub fn erase<Q>(&mut self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let m = self.branching;
        let minf = self.min_fill();
        let removed = Self::erase_rec(&mut self.root, key, true, m, minf);
        if removed {
            self.len -= 1;
            while !self.root.leaf && self.root.keys.is_empty() {
                match self.root.children.pop() {
                    Some(only) => self.root = only,
                    None => break,
                }
            }
        }
        removed
    }

    fn erase_rec<Q>(node: &mut Node<K, V>, key: &Q, is_root: bool, m: usize, minf: usize) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if node.leaf {
            return match node.keys.binary_search_by(|k| k.borrow().cmp(key)) {
                Ok(i) => {
                    node.keys.remove(i);
                    node.values.remove(i);
                    true
                }
                Err(_) => false,
            };
        }
        let ci = match node.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        let removed = Self::erase_rec(&mut node.children[ci], key, false, m, minf);
        if removed {
            let child_min = if is_root { 1 } else { minf };
            if node.children[ci].keys.len() < child_min {
                Self::repair_child(node, ci, is_root, m, minf);
            }
            // erasing a subtree's leftmost key invalidates the separator
            // pointing at it, possibly several levels up
            Self::refresh_separators(node);
        }
        removed
    }

    fn leftmost_key(node: &Node<K, V>) -> Option<&K> {
        let mut cursor = node;
        while !cursor.leaf {
            cursor = cursor.children.first()?.as_ref();
        }
        cursor.keys.first()
    }

    fn refresh_separators(node: &mut Node<K, V>) {
        for i in 0..node.keys.len() {
            let first = Self::leftmost_key(&node.children[i + 1]).cloned();
            if let Some(first) = first {
                node.keys[i] = first;
            }
        }
    }

    /// Bring the under-filled child at `i` back to its bound: borrow from
    /// the left then right sibling, merge pairwise when the result fits,
    /// otherwise pool three adjacent siblings (rightmost triple first)
    /// into two or back into three. A parent holding only two children
    /// falls back to a balanced two-way redistribution.
    fn repair_child(parent: &mut Node<K, V>, i: usize, parent_is_root: bool, m: usize, minf: usize) {
        let donor_min = if parent_is_root { 1 } else { minf };
        let width = parent.children.len();
        if i > 0 && Self::try_borrow_from_left(parent, i, donor_min) {
            return;
        }
        if i + 1 < width && Self::try_borrow_from_right(parent, i, donor_min) {
            return;
        }
        if i > 0 && Self::try_pair_merge(parent, i - 1, m) {
            return;
        }
        if i + 1 < width && Self::try_pair_merge(parent, i, m) {
            return;
        }
        if i + 2 < width {
            Self::triple_rebalance(parent, i, m);
            return;
        }
        if i >= 1 && i + 1 < width {
            Self::triple_rebalance(parent, i - 1, m);
            return;
        }
        if i >= 2 {
            Self::triple_rebalance(parent, i - 2, m);
            return;
        }
        if i + 1 < width {
            Self::pair_redistribute(parent, i);
        } else if i > 0 {
            Self::pair_redistribute(parent, i - 1);
        }
    }

    fn try_borrow_from_left(parent: &mut Node<K, V>, i: usize, donor_min: usize) -> bool {
        if parent.children[i - 1].keys.len() <= donor_min {
            return false;
        }
        let (head, tail) = parent.children.split_at_mut(i);
        let left = &mut *head[i - 1];
        let child = &mut *tail[0];
        if child.leaf {
            if let (Some(k), Some(v)) = (left.keys.pop(), left.values.pop()) {
                child.keys.insert(0, k);
                child.values.insert(0, v);
            }
            parent.keys[i - 1] = child.keys[0].clone();
        } else {
            if let Some(borrowed) = left.keys.pop() {
                let separator = std::mem::replace(&mut parent.keys[i - 1], borrowed);
                child.keys.insert(0, separator);
            }
            if let Some(ch) = left.children.pop() {
                child.children.insert(0, ch);
            }
        }
        true
    }

    fn try_borrow_from_right(parent: &mut Node<K, V>, i: usize, donor_min: usize) -> bool {
        if parent.children[i + 1].keys.len() <= donor_min {
            return false;
        }
        let (head, tail) = parent.children.split_at_mut(i + 1);
        let child = &mut *head[i];
        let right = &mut *tail[0];
        if child.leaf {
            child.keys.push(right.keys.remove(0));
            child.values.push(right.values.remove(0));
            parent.keys[i] = right.keys[0].clone();
        } else {
            let separator = std::mem::replace(&mut parent.keys[i], right.keys.remove(0));
            child.keys.push(separator);
            child.children.push(right.children.remove(0));
        }
        true
    }

    /// Merge the pair `(li, li + 1)` into one node when it fits.
    fn try_pair_merge(parent: &mut Node<K, V>, li: usize, m: usize) -> bool {
        let lk = parent.children[li].keys.len();
        let rk = parent.children[li + 1].keys.len();
        let leaf = parent.children[li].leaf;
        let fits = if leaf { lk + rk <= m } else { lk + rk + 1 <= m };
        if !fits {
            return false;
        }
        let mut right = *parent.children.remove(li + 1);
        let separator = parent.keys.remove(li);
        let left = &mut *parent.children[li];
        if leaf {
            left.keys.append(&mut right.keys);
            left.values.append(&mut right.values);
        } else {
            left.keys.push(separator);
            left.keys.append(&mut right.keys);
            left.children.append(&mut right.children);
        }
        true
    }

    /// Pool the three children starting at `li` and rebuild them as two
    /// nodes when that fits the branching factor, else as three balanced
    /// ones.
    fn triple_rebalance(parent: &mut Node<K, V>, li: usize, m: usize) {
        let leaf = parent.children[li].leaf;
        let mut c2 = *parent.children.remove(li + 2);
        let mut c1 = *parent.children.remove(li + 1);
        let sep2 = parent.keys.remove(li + 1);
        let sep1 = parent.keys.remove(li);

        if leaf {
            let mut keys;
            let mut values;
            {
                let c0 = &mut *parent.children[li];
                keys = std::mem::take(&mut c0.keys);
                keys.append(&mut c1.keys);
                keys.append(&mut c2.keys);
                values = std::mem::take(&mut c0.values);
                values.append(&mut c1.values);
                values.append(&mut c2.values);
            }
            let total = keys.len();
            if total - total / 2 <= m {
                let right_keys = keys.split_off(total / 2);
                let right_values = values.split_off(total / 2);
                parent.children[li].keys = keys;
                parent.children[li].values = values;
                let separator = right_keys[0].clone();
                let right = Node {
                    leaf: true,
                    keys: right_keys,
                    values: right_values,
                    children: Vec::new(),
                };
                parent.keys.insert(li, separator);
                parent.children.insert(li + 1, Box::new(right));
            } else {
                let q = total / 3;
                let r = total % 3;
                let (s1, s2) = (q + usize::from(r > 0), q + usize::from(r > 1));
                let mut rest_keys = keys.split_off(s1);
                let mut rest_values = values.split_off(s1);
                c2.keys = rest_keys.split_off(s2);
                c2.values = rest_values.split_off(s2);
                c1.keys = rest_keys;
                c1.values = rest_values;
                parent.children[li].keys = keys;
                parent.children[li].values = values;
                parent.keys.insert(li, c1.keys[0].clone());
                parent.keys.insert(li + 1, c2.keys[0].clone());
                parent.children.insert(li + 1, Box::new(c1));
                parent.children.insert(li + 2, Box::new(c2));
            }
        } else {
            let mut keys;
            let mut children;
            {
                let c0 = &mut *parent.children[li];
                keys = std::mem::take(&mut c0.keys);
                keys.push(sep1);
                keys.append(&mut c1.keys);
                keys.push(sep2);
                keys.append(&mut c2.keys);
                children = std::mem::take(&mut c0.children);
                children.append(&mut c1.children);
                children.append(&mut c2.children);
            }
            let total = keys.len();
            let left_n = (total - 1) / 2;
            let right_n = total - 1 - left_n;
            if left_n.max(right_n) <= m {
                let mut rest_keys = keys.split_off(left_n);
                let promoted = rest_keys.remove(0);
                let right_children = children.split_off(left_n + 1);
                parent.children[li].keys = keys;
                parent.children[li].children = children;
                let right = Node {
                    leaf: false,
                    keys: rest_keys,
                    values: Vec::new(),
                    children: right_children,
                };
                parent.keys.insert(li, promoted);
                parent.children.insert(li + 1, Box::new(right));
            } else {
                let spread = total - 2;
                let q = spread / 3;
                let r = spread % 3;
                let (k1, k2) = (q + usize::from(r > 0), q + usize::from(r > 1));
                let mut rest_keys = keys.split_off(k1);
                let up1 = rest_keys.remove(0);
                let mut third_keys = rest_keys.split_off(k2);
                let up2 = third_keys.remove(0);
                let mut rest_children = children.split_off(k1 + 1);
                let third_children = rest_children.split_off(k2 + 1);
                parent.children[li].keys = keys;
                parent.children[li].children = children;
                c1.keys = rest_keys;
                c1.children = rest_children;
                c2.keys = third_keys;
                c2.children = third_children;
                parent.keys.insert(li, up1);
                parent.keys.insert(li + 1, up2);
                parent.children.insert(li + 1, Box::new(c1));
                parent.children.insert(li + 2, Box::new(c2));
            }
        }
    }

    /// Balanced two-way redistribution; last resort for a parent with
    /// only two children whose pool exceeds one node.
    fn pair_redistribute(parent: &mut Node<K, V>, li: usize) {
        let leaf = parent.children[li].leaf;
        let (head, tail) = parent.children.split_at_mut(li + 1);
        let left = &mut *head[li];
        let right = &mut *tail[0];
        if leaf {
            let mut keys = std::mem::take(&mut left.keys);
            keys.append(&mut right.keys);
            let mut values = std::mem::take(&mut left.values);
            values.append(&mut right.values);
            let target = keys.len() / 2;
            let right_keys = keys.split_off(target);
            let right_values = values.split_off(target);
            parent.keys[li] = right_keys[0].clone();
            left.keys = keys;
            left.values = values;
            right.keys = right_keys;
            right.values = right_values;
        } else {
            let mut keys = std::mem::take(&mut left.keys);
            keys.push(parent.keys[li].clone());
            keys.append(&mut right.keys);
            let mut children = std::mem::take(&mut left.children);
            children.append(&mut right.children);
            let target = (keys.len() - 1) / 2;
            let mut right_keys = keys.split_off(target);
            let separator = right_keys.remove(0);
            let right_children = children.split_off(target + 1);
            parent.keys[li] = separator;
            left.keys = keys;
            left.children = children;
            right.keys = right_keys;
            right.children = right_children;
        }
    }

    /// Walk the whole tree and check key-count bounds, arity, value
    /// parity, key ordering, separator equality, and leaf depth.
    pub fn validate(&self) -> std::result::Result<(), IndexViolation> {
        let mut leaf_depth = None;
        self.validate_node(&self.root, true, true, 0, &mut leaf_depth)?;
        Self::validate_separators(&self.root)
    }

    fn validate_node(
        &self,
        node: &Node<K, V>,
        is_root: bool,
        parent_is_root: bool,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> std::result::Result<(), IndexViolation> {
        let min = if is_root {
            0
        } else if parent_is_root {
            1
        } else {
            self.min_fill()
        };
        if node.keys.len() > self.branching {
            return Err(IndexViolation::Overflow {
                found: node.keys.len(),
                max: self.branching,
            });
        }
        if node.keys.len() < min {
            return Err(IndexViolation::Underflow {
                found: node.keys.len(),
                min,
            });
        }
        if !node.keys.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(IndexViolation::KeyOrder);
        }
        if node.leaf {
            if node.values.len() != node.keys.len() {
                return Err(IndexViolation::ValueParity {
                    keys: node.keys.len(),
                    values: node.values.len(),
                });
            }
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(expected) if expected != depth => return Err(IndexViolation::LeafDepth),
                Some(_) => {}
            }
        } else {
            if node.children.len() != node.keys.len() + 1 {
                return Err(IndexViolation::Arity {
                    keys: node.keys.len(),
                    children: node.children.len(),
                });
            }
            for child in &node.children {
                self.validate_node(child, false, is_root, depth + 1, leaf_depth)?;
            }
        }
        Ok(())
    }

    fn validate_separators(node: &Node<K, V>) -> std::result::Result<(), IndexViolation> {
        if node.leaf {
            return Ok(());
        }
        for (i, separator) in node.keys.iter().enumerate() {
            match Self::leftmost_key(&node.children[i + 1]) {
                Some(first) if first == separator => {}
                _ => return Err(IndexViolation::SeparatorMismatch),
            }
        }
        for child in &node.children {
            Self::validate_separators(child)?;
        }
        Ok(())
    }
}
