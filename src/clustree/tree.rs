use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use log::debug;
use num::{Float, FromPrimitive};

use crate::common::AnyOutError;

use super::kernel::ClusterKernel;

/// Fan-out of every node.
const NUMBER_ENTRIES: usize = 3;

/// Index of a node inside the tree's arena. Stable for the lifetime of the
/// tree: nodes are never removed, only grown.
pub type NodeId = usize;

/// One slot of a node: a summary kernel and, below the leaf level, the node it
/// summarizes.
#[derive(Debug, Clone)]
pub struct Entry<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> {
    kernel: ClusterKernel<F>,
    child: Option<NodeId>,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> Entry<F> {
    fn new(kernel: ClusterKernel<F>) -> Self {
        Self {
            kernel,
            child: None,
        }
    }

    pub fn kernel(&self) -> &ClusterKernel<F> {
        &self.kernel
    }

    pub fn weight(&self) -> F {
        self.kernel.weight()
    }

    pub fn child(&self) -> Option<NodeId> {
        self.child
    }
}

#[derive(Debug, Clone)]
struct Node<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> {
    entries: Vec<Entry<F>>,
    last_update: u64,
}

/// Height-bounded online summarization tree over cluster-feature kernels.
///
/// Each node holds up to three entries; an entry above the leaf level
/// summarizes its whole subtree. Insertion descends along nearest entries,
/// folding the new point into every summary on the path, and grows a crowded
/// leaf one level downward while the height bound allows it. Entries touched
/// by an insertion are aged with an exponential decay tuned so that a summary
/// left alone for `horizon` insertions falls to `weight_threshold` of its
/// weight, which is what makes sparse branches prunable by the scorer.
///
/// # Parameters
///
/// - `max_height`: The maximal number of descents from the root.
/// - `horizon`: The number of insertions over which an untouched summary
///   decays to `weight_threshold`.
/// - `weight_threshold`: The weight below which a summary counts as
///   irrelevant.
pub struct ClusTree<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> {
    nodes: Vec<Node<F>>,
    root: Option<NodeId>,
    dim: Option<usize>,
    height: usize,
    max_height: usize,
    neg_lambda: F,
    timestamp: u64,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> ClusTree<F> {
    pub fn new(max_height: usize, horizon: usize, weight_threshold: F) -> Self {
        let neg_lambda = weight_threshold.log2() / F::from_usize(horizon.max(1)).unwrap();
        Self {
            nodes: Vec::new(),
            root: None,
            dim: None,
            height: 0,
            max_height,
            neg_lambda,
            timestamp: 0,
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Dimensionality of the points seen so far, `None` before the first
    /// insertion.
    pub fn dimension(&self) -> Option<usize> {
        self.dim
    }

    /// Current height: the number of descents to the deepest node. A tree
    /// holding only a root has height 0.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn max_height(&self) -> usize {
        self.max_height
    }

    /// Number of points inserted so far.
    pub fn points(&self) -> u64 {
        self.timestamp
    }

    /// The entry of `node` whose summary center is closest to the given
    /// kernel's center.
    pub fn nearest_entry(&self, node: NodeId, kernel: &ClusterKernel<F>) -> Option<&Entry<F>> {
        let node = self.nodes.get(node)?;
        let mut best: Option<(&Entry<F>, F)> = None;
        for entry in &node.entries {
            let distance = entry.kernel.distance(kernel);
            match best {
                Some((_, min)) if distance >= min => {}
                _ => best = Some((entry, distance)),
            }
        }
        best.map(|(entry, _)| entry)
    }

    fn nearest_entry_index(&self, node: NodeId, kernel: &ClusterKernel<F>) -> usize {
        let node = &self.nodes[node];
        let mut best = 0;
        let mut min = node.entries[0].kernel.distance(kernel);
        for (i, entry) in node.entries.iter().enumerate().skip(1) {
            let distance = entry.kernel.distance(kernel);
            if distance < min {
                min = distance;
                best = i;
            }
        }
        best
    }

    /// Insert one kernel, online. Descends along nearest entries, aggregating
    /// the kernel into every summary on the path.
    pub fn insert(&mut self, kernel: ClusterKernel<F>) -> Result<(), AnyOutError> {
        match self.dim {
            Some(expected) if expected != kernel.dim() => {
                return Err(AnyOutError::DimensionMismatch {
                    expected,
                    found: kernel.dim(),
                })
            }
            None => self.dim = Some(kernel.dim()),
            _ => {}
        }

        self.timestamp += 1;
        let timestamp = self.timestamp;

        let mut node_id = match self.root {
            Some(root) => root,
            None => {
                let root = self.push_node(Node {
                    entries: vec![Entry::new(kernel)],
                    last_update: timestamp,
                });
                self.root = Some(root);
                debug!("clustree: created root at timestamp {}", timestamp);
                return Ok(());
            }
        };

        let mut depth = 0;
        loop {
            self.age_node(node_id, timestamp);
            let index = self.nearest_entry_index(node_id, &kernel);
            match self.nodes[node_id].entries[index].child {
                Some(child) => {
                    self.nodes[node_id].entries[index].kernel.add(&kernel);
                    node_id = child;
                    depth += 1;
                }
                None => {
                    if self.nodes[node_id].entries.len() < NUMBER_ENTRIES {
                        self.nodes[node_id].entries.push(Entry::new(kernel));
                    } else if depth + 1 <= self.max_height {
                        // Crowded leaf: push the nearest summary one level
                        // down and keep refining below it.
                        let seed = self.nodes[node_id].entries[index].kernel.clone();
                        let child = self.push_node(Node {
                            entries: vec![Entry::new(seed), Entry::new(kernel.clone())],
                            last_update: timestamp,
                        });
                        let entry = &mut self.nodes[node_id].entries[index];
                        entry.child = Some(child);
                        entry.kernel.add(&kernel);
                        if depth + 1 > self.height {
                            self.height = depth + 1;
                            debug!("clustree: height grew to {}", self.height);
                        }
                    } else {
                        // Height bound reached, merge instead of growing.
                        self.nodes[node_id].entries[index].kernel.add(&kernel);
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    fn push_node(&mut self, node: Node<F>) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn age_node(&mut self, node_id: NodeId, timestamp: u64) {
        let dt = timestamp.saturating_sub(self.nodes[node_id].last_update);
        if dt > 0 {
            let exponent = self.neg_lambda * F::from_u64(dt).unwrap();
            let factor = F::from_f64(2.0).unwrap().powf(exponent);
            for entry in self.nodes[node_id].entries.iter_mut() {
                entry.kernel.scale(factor);
            }
        }
        self.nodes[node_id].last_update = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn kernel(values: &[f64]) -> ClusterKernel<f64> {
        ClusterKernel::from_point(&Array1::from_vec(values.to_vec()))
    }

    fn tree(max_height: usize) -> ClusTree<f64> {
        ClusTree::new(max_height, 1000, 0.05)
    }

    #[test]
    fn test_empty_tree() {
        let t = tree(8);
        assert!(t.root().is_none());
        assert_eq!(t.height(), 0);
        assert_eq!(t.dimension(), None);
    }

    #[test]
    fn test_first_insert_creates_root() {
        let mut t = tree(8);
        t.insert(kernel(&[1.0, 1.0])).unwrap();
        let root = t.root().unwrap();
        assert_eq!(t.height(), 0);
        assert_eq!(t.dimension(), Some(2));
        let entry = t.nearest_entry(root, &kernel(&[1.0, 1.0])).unwrap();
        assert!((entry.weight() - 1.0).abs() < 1e-9);
        assert!(entry.child().is_none());
    }

    #[test]
    fn test_nearest_entry_picks_closest_center() {
        let mut t = tree(8);
        t.insert(kernel(&[0.0, 0.0])).unwrap();
        t.insert(kernel(&[10.0, 10.0])).unwrap();
        let root = t.root().unwrap();
        let near_origin = t.nearest_entry(root, &kernel(&[1.0, 1.0])).unwrap();
        assert!(near_origin.kernel().center()[0] < 5.0);
        let near_far = t.nearest_entry(root, &kernel(&[9.0, 9.0])).unwrap();
        assert!(near_far.kernel().center()[0] > 5.0);
    }

    #[test]
    fn test_crowded_leaf_grows_downward() {
        let mut t = tree(8);
        for v in [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 10.0]] {
            t.insert(kernel(&v)).unwrap();
        }
        assert_eq!(t.height(), 1);
        let root = t.root().unwrap();
        let entry = t.nearest_entry(root, &kernel(&[10.0, 10.0])).unwrap();
        assert!(entry.child().is_some());
    }

    #[test]
    fn test_height_stays_bounded() {
        let mut t = tree(2);
        for i in 0..200 {
            let x = (i % 17) as f64;
            let y = (i % 23) as f64;
            t.insert(kernel(&[x, y])).unwrap();
        }
        assert!(t.height() <= 2);
        assert_eq!(t.points(), 200);
    }

    #[test]
    fn test_path_summaries_accumulate_weight() {
        let mut t = tree(8);
        for _ in 0..5 {
            t.insert(kernel(&[1.0, 1.0])).unwrap();
        }
        let root = t.root().unwrap();
        let entry = t.nearest_entry(root, &kernel(&[1.0, 1.0])).unwrap();
        // The entry that was pushed down keeps collecting the points routed
        // through it, so it outweighs any single point.
        assert!(entry.weight() > 2.0);
        assert!(entry.weight() <= 5.0);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let mut t = tree(8);
        t.insert(kernel(&[1.0, 2.0])).unwrap();
        let err = t.insert(kernel(&[1.0, 2.0, 3.0])).unwrap_err();
        assert_eq!(
            err,
            AnyOutError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_decay_never_negative() {
        let mut t = tree(1);
        t.insert(kernel(&[0.0])).unwrap();
        for i in 0..5000 {
            t.insert(kernel(&[100.0 + (i % 3) as f64])).unwrap();
        }
        let root = t.root().unwrap();
        let stale = t.nearest_entry(root, &kernel(&[0.0])).unwrap();
        assert!(stale.weight() >= 0.0);
    }
}
