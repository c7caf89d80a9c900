//! Host-side red-black tree used to shape the debuggee's maps
//!
//! Nodes live in an arena and refer to each other by index. Insertion is the
//! textbook bottom-up algorithm with parent links; the emitters copy the
//! resulting links and colors into target memory, so every tree the
//! formatters see has a shape a real library could have produced.

/// One arena slot
#[derive(Debug, Clone)]
pub struct RbNode<K> {
    pub key: K,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub parent: Option<usize>,
    pub red: bool,
}

#[derive(Debug, Clone)]
pub struct RbTree<K> {
    nodes: Vec<RbNode<K>>,
    root: Option<usize>,
}

impl<K: Ord> RbTree<K> {
    pub fn new() -> Self {
        RbTree {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    pub fn node(&self, index: usize) -> &RbNode<K> {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[RbNode<K>] {
        &self.nodes
    }

    /// Index of the node holding `key`
    pub fn find(&self, key: &K) -> Option<usize> {
        let mut current = self.root;
        while let Some(index) = current {
            let node = &self.nodes[index];
            current = match key.cmp(&node.key) {
                std::cmp::Ordering::Less => node.left,
                std::cmp::Ordering::Greater => node.right,
                std::cmp::Ordering::Equal => return Some(index),
            };
        }
        None
    }

    /// Insert `key`; returns `Ok(new index)`, or `Err(existing index)` if
    /// the key is already present. New indices are assigned sequentially.
    pub fn insert(&mut self, key: K) -> Result<usize, usize> {
        let mut parent = None;
        let mut current = self.root;
        let mut go_left = false;
        while let Some(index) = current {
            parent = Some(index);
            let node = &self.nodes[index];
            match key.cmp(&node.key) {
                std::cmp::Ordering::Less => {
                    go_left = true;
                    current = node.left;
                }
                std::cmp::Ordering::Greater => {
                    go_left = false;
                    current = node.right;
                }
                std::cmp::Ordering::Equal => return Err(index),
            }
        }

        let index = self.nodes.len();
        self.nodes.push(RbNode {
            key,
            left: None,
            right: None,
            parent,
            red: true,
        });
        match parent {
            None => self.root = Some(index),
            Some(p) if go_left => self.nodes[p].left = Some(index),
            Some(p) => self.nodes[p].right = Some(index),
        }
        self.fix_insert(index);
        Ok(index)
    }

    /// Leftmost node (smallest key)
    pub fn leftmost(&self) -> Option<usize> {
        let mut current = self.root?;
        while let Some(left) = self.nodes[current].left {
            current = left;
        }
        Some(current)
    }

    /// Rightmost node (largest key)
    pub fn rightmost(&self) -> Option<usize> {
        let mut current = self.root?;
        while let Some(right) = self.nodes[current].right {
            current = right;
        }
        Some(current)
    }

    /// Node indices in key order
    pub fn in_order(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut current = self.root;
        while current.is_some() || !stack.is_empty() {
            while let Some(index) = current {
                stack.push(index);
                current = self.nodes[index].left;
            }
            if let Some(index) = stack.pop() {
                out.push(index);
                current = self.nodes[index].right;
            }
        }
        out
    }

    fn is_red(&self, index: Option<usize>) -> bool {
        index.is_some_and(|i| self.nodes[i].red)
    }

    fn fix_insert(&mut self, mut z: usize) {
        while let Some(p) = self.nodes[z].parent {
            if !self.nodes[p].red {
                break;
            }
            // A red node is never the root, so the grandparent exists
            let Some(g) = self.nodes[p].parent else {
                break;
            };

            if self.nodes[g].left == Some(p) {
                let uncle = self.nodes[g].right;
                if self.is_red(uncle) {
                    self.recolor(p, uncle, g);
                    z = g;
                } else {
                    if self.nodes[p].right == Some(z) {
                        z = p;
                        self.rotate_left(z);
                    }
                    self.rotate_at_grandparent(z, false);
                }
            } else {
                let uncle = self.nodes[g].left;
                if self.is_red(uncle) {
                    self.recolor(p, uncle, g);
                    z = g;
                } else {
                    if self.nodes[p].left == Some(z) {
                        z = p;
                        self.rotate_right(z);
                    }
                    self.rotate_at_grandparent(z, true);
                }
            }
        }
        if let Some(root) = self.root {
            self.nodes[root].red = false;
        }
    }

    fn recolor(&mut self, parent: usize, uncle: Option<usize>, grandparent: usize) {
        self.nodes[parent].red = false;
        if let Some(u) = uncle {
            self.nodes[u].red = false;
        }
        self.nodes[grandparent].red = true;
    }

    fn rotate_at_grandparent(&mut self, z: usize, rotate_left: bool) {
        let Some(p) = self.nodes[z].parent else {
            return;
        };
        let Some(g) = self.nodes[p].parent else {
            return;
        };
        self.nodes[p].red = false;
        self.nodes[g].red = true;
        if rotate_left {
            self.rotate_left(g);
        } else {
            self.rotate_right(g);
        }
    }

    fn rotate_left(&mut self, x: usize) {
        let Some(y) = self.nodes[x].right else {
            return;
        };
        let y_left = self.nodes[y].left;
        self.nodes[x].right = y_left;
        if let Some(b) = y_left {
            self.nodes[b].parent = Some(x);
        }
        self.replace_child(x, y);
        self.nodes[y].left = Some(x);
        self.nodes[x].parent = Some(y);
    }

    fn rotate_right(&mut self, x: usize) {
        let Some(y) = self.nodes[x].left else {
            return;
        };
        let y_right = self.nodes[y].right;
        self.nodes[x].left = y_right;
        if let Some(b) = y_right {
            self.nodes[b].parent = Some(x);
        }
        self.replace_child(x, y);
        self.nodes[y].right = Some(x);
        self.nodes[x].parent = Some(y);
    }

    /// Put `new` where `old` hangs from its parent
    fn replace_child(&mut self, old: usize, new: usize) {
        let parent = self.nodes[old].parent;
        self.nodes[new].parent = parent;
        match parent {
            None => self.root = Some(new),
            Some(p) if self.nodes[p].left == Some(old) => self.nodes[p].left = Some(new),
            Some(p) => self.nodes[p].right = Some(new),
        }
    }
}

impl<K: Ord> Default for RbTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Black height of the subtree, checking the red-black rules on the way
    fn check(tree: &RbTree<i32>, index: Option<usize>) -> usize {
        let Some(i) = index else {
            return 1;
        };
        let node = tree.node(i);
        if node.red {
            assert!(!tree.is_red(node.left) && !tree.is_red(node.right));
        }
        for child in [node.left, node.right].into_iter().flatten() {
            assert_eq!(tree.node(child).parent, Some(i));
        }
        let left = check(tree, node.left);
        let right = check(tree, node.right);
        assert_eq!(left, right);
        left + usize::from(!node.red)
    }

    #[test]
    fn test_sequential_inserts_stay_balanced() {
        let mut tree = RbTree::new();
        for k in 0..100 {
            assert_eq!(tree.insert(k), Ok(k as usize));
        }
        assert!(!tree.node(tree.root().unwrap()).red);
        let black_height = check(&tree, tree.root());
        assert!(black_height <= 8);

        let keys: Vec<i32> = tree.in_order().iter().map(|&i| tree.node(i).key).collect();
        assert_eq!(keys, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicate_insert_returns_existing() {
        let mut tree = RbTree::new();
        tree.insert(5).unwrap();
        tree.insert(3).unwrap();
        assert_eq!(tree.insert(5), Err(0));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.find(&3), Some(1));
        assert_eq!(tree.find(&4), None);
    }

    #[test]
    fn test_mixed_inserts_and_extremes() {
        let mut tree = RbTree::new();
        for k in [41, 38, 31, 12, 19, 8, 50, 45, 1] {
            tree.insert(k).unwrap();
        }
        check(&tree, tree.root());
        assert_eq!(tree.node(tree.leftmost().unwrap()).key, 1);
        assert_eq!(tree.node(tree.rightmost().unwrap()).key, 50);
    }
}
