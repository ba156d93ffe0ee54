use std::collections::VecDeque;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use num::{Float, FromPrimitive};
use rand::prelude::*;

use crate::clustree::{ClusTree, ClusterKernel, NodeId};
use crate::common::AnyOutError;

use super::confidence::ConfidenceCombination;

/// How the dissimilarity between an object and a tree summary is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFunction {
    /// Euclidean distance between the object and the summary center.
    Distance,
    /// `1 - density` under a multivariate-Gaussian-shaped kernel built from
    /// the summary's variance vector. A heuristic: the raw density is not a
    /// calibrated probability and the result may leave [0, 1]. Only its
    /// ordering is meaningful.
    Density,
}

impl ScoreFunction {
    pub(crate) fn score<F>(&self, x: &ClusterKernel<F>, summary: &ClusterKernel<F>) -> F
    where
        F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign,
    {
        match self {
            ScoreFunction::Distance => x.distance(summary),
            ScoreFunction::Density => {
                let mu = summary.center();
                let variance = summary.variance_vector();
                let center = x.center();
                let d = x.dim();

                // factor = (2 pi)^(d/2) * prod_i sqrt(var_i)
                let two_pi = F::from_f64(2.0 * std::f64::consts::PI).unwrap();
                let half = F::from_f64(0.5).unwrap();
                let mut factor = two_pi.powf(F::from_usize(d).unwrap() * half);
                let mut exponent = F::zero();
                for i in 0..d {
                    factor *= variance[i].sqrt();
                    let diff = center[i] - mu[i];
                    exponent += diff * diff / variance[i];
                }
                let density = (-half * exponent).exp() / factor;
                F::one() - density
            }
        }
    }
}

/// Per-object fraction of the maximal tree height an object is allowed to
/// descend before its refinement is cut off. The draw is what simulates the
/// anytime interrupt; tests pin it with `Fixed`.
#[derive(Debug, Clone, Copy)]
pub enum DepthPolicy<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> {
    /// Uniform draw from [0, 1) clamped into `[min, max]`.
    Uniform { min: F, max: F },
    /// The same fraction for every object.
    Fixed(F),
    /// Pure function of the object id, for external schedules.
    Custom(fn(u64) -> f64),
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> DepthPolicy<F> {
    pub(crate) fn fraction(&self, id: u64, rng: &mut ThreadRng) -> F {
        match self {
            DepthPolicy::Uniform { min, max } => {
                let draw = F::from_f64(rng.gen::<f64>()).unwrap();
                if draw < *min {
                    *min
                } else if draw > *max {
                    *max
                } else {
                    draw
                }
            }
            DepthPolicy::Fixed(fraction) => *fraction,
            DepthPolicy::Custom(f) => F::from_f64(f(id)).unwrap(),
        }
    }
}

/// The refinement state of one live object: where its probe currently stands
/// in the tree and the score trail it left on the way down.
#[derive(Debug, Clone)]
pub struct ProbeState<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> {
    pub(crate) depth: usize,
    pub(crate) last_score: F,
    pub(crate) aggregated: F,
    pub(crate) confidence: F,
    pub(crate) history: VecDeque<F>,
    pub(crate) frontier: Option<NodeId>,
    pub(crate) kernel: ClusterKernel<F>,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> ProbeState<F> {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn last_score(&self) -> F {
        self.last_score
    }

    pub fn aggregated(&self) -> F {
        self.aggregated
    }

    pub fn confidence(&self) -> F {
        self.confidence
    }

    pub fn frontier(&self) -> Option<NodeId> {
        self.frontier
    }

    pub fn kernel(&self) -> &ClusterKernel<F> {
        &self.kernel
    }
}

/// The anytime scoring engine. Stateless across objects: all per-object state
/// lives in the `ProbeState`, the engine only carries configuration.
pub struct AnytimeScorer<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign>
{
    score_function: ScoreFunction,
    confidence_choice: ConfidenceCombination,
    score_k: usize,
    conf_k: usize,
    weight_threshold: F,
    max_height: usize,
    history_capacity: usize,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> AnytimeScorer<F> {
    pub fn new(
        score_function: ScoreFunction,
        confidence_choice: ConfidenceCombination,
        score_k: usize,
        conf_k: usize,
        weight_threshold: F,
        max_height: usize,
    ) -> Self {
        Self {
            score_function,
            confidence_choice,
            score_k,
            conf_k,
            weight_threshold,
            max_height,
            history_capacity: score_k.max(conf_k),
        }
    }

    /// Probes the tree root once and builds the initial state for a fresh
    /// object. On an empty tree (cold start) the score is 0 and there is no
    /// frontier to descend into.
    pub fn init_probe(
        &self,
        tree: &ClusTree<F>,
        kernel: ClusterKernel<F>,
    ) -> Result<ProbeState<F>, AnyOutError> {
        if let Some(expected) = tree.dimension() {
            if kernel.dim() != expected {
                return Err(AnyOutError::DimensionMismatch {
                    expected,
                    found: kernel.dim(),
                });
            }
        }

        let mut probe = ProbeState {
            depth: 0,
            last_score: F::zero(),
            aggregated: F::zero(),
            confidence: F::zero(),
            history: VecDeque::with_capacity(self.history_capacity),
            frontier: None,
            kernel,
        };

        if let Some(root) = tree.root() {
            if let Some(entry) = tree.nearest_entry(root, &probe.kernel) {
                probe.last_score = self.score_function.score(&probe.kernel, entry.kernel());
                probe.aggregated = probe.last_score;
                probe.frontier = entry.child();
            }
        }
        probe.confidence = self.confidence(&probe, tree);
        Ok(probe)
    }

    /// True while the object may still be refined: its probe has not used up
    /// the depth budget and the last descent left a node to continue into.
    pub fn more_improvements_possible(&self, probe: &ProbeState<F>, fraction: F) -> bool {
        let budget = F::from_usize(self.max_height).unwrap() * fraction;
        F::from_usize(probe.depth).unwrap() < budget && probe.frontier.is_some()
    }

    /// One refinement step: descend one level towards the object and rescore
    /// against the nearest summary there. A summary whose weight sits below
    /// the relevance threshold marks a dead branch; the probe keeps its last
    /// valid score and stops refining.
    pub fn improve_once(&self, tree: &ClusTree<F>, probe: &mut ProbeState<F>) {
        probe.depth += 1;
        let previous = probe.last_score;
        probe.history.push_back(previous);
        if probe.history.len() > self.history_capacity {
            probe.history.pop_front();
        }

        let node = match probe.frontier {
            Some(node) => node,
            None => return,
        };
        let entry = match tree.nearest_entry(node, &probe.kernel) {
            Some(entry) => entry,
            None => {
                probe.frontier = None;
                return;
            }
        };
        if entry.weight() < self.weight_threshold {
            probe.frontier = None;
            return;
        }

        probe.last_score = self.score_function.score(&probe.kernel, entry.kernel());
        probe.aggregated = self.aggregate(probe);
        probe.frontier = entry.child();
        probe.confidence = self.confidence(probe, tree);
    }

    /// Moving average over the current score and at most the `score_k - 1`
    /// most recent previous ones; degenerates to the latest score alone for
    /// `score_k <= 1`.
    fn aggregate(&self, probe: &ProbeState<F>) -> F {
        if self.score_k <= 1 {
            return probe.last_score;
        }
        let mut sum = probe.last_score;
        let mut count = 1;
        for score in probe.history.iter().rev().take(self.score_k - 1) {
            sum += *score;
            count += 1;
        }
        sum / F::from_usize(count).unwrap()
    }

    fn confidence(&self, probe: &ProbeState<F>, tree: &ClusTree<F>) -> F {
        self.confidence_choice.evaluate(
            probe.last_score,
            &probe.history,
            probe.depth,
            self.conf_k,
            tree.height(),
            self.max_height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn kernel(values: &[f64]) -> ClusterKernel<f64> {
        ClusterKernel::from_point(&Array1::from_vec(values.to_vec()))
    }

    fn scorer(score_k: usize, weight_threshold: f64) -> AnytimeScorer<f64> {
        AnytimeScorer::new(
            ScoreFunction::Distance,
            ConfidenceCombination::Magnitude,
            score_k,
            2,
            weight_threshold,
            8,
        )
    }

    /// Two spread-out clusters, enough points to force a second level.
    fn two_cluster_tree() -> ClusTree<f64> {
        let mut tree = ClusTree::new(8, 1000, 0.05);
        for v in [
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [10.0, 10.0],
            [11.0, 10.0],
            [10.0, 11.0],
        ] {
            tree.insert(kernel(&v)).unwrap();
        }
        tree
    }

    #[test]
    fn test_init_probe_on_empty_tree() {
        let tree: ClusTree<f64> = ClusTree::new(8, 1000, 0.05);
        let probe = scorer(2, 0.05).init_probe(&tree, kernel(&[1.0, 2.0])).unwrap();
        assert_eq!(probe.depth(), 0);
        assert_eq!(probe.last_score(), 0.0);
        assert!(probe.frontier().is_none());
    }

    #[test]
    fn test_init_probe_checks_dimensionality() {
        let tree = two_cluster_tree();
        let err = scorer(2, 0.05)
            .init_probe(&tree, kernel(&[1.0]))
            .unwrap_err();
        assert_eq!(
            err,
            AnyOutError::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_refinement_increases_depth_and_halts() {
        let tree = two_cluster_tree();
        let engine = scorer(2, 0.05);
        let mut probe = engine.init_probe(&tree, kernel(&[10.5, 10.5])).unwrap();

        let mut last_depth = probe.depth();
        let mut steps = 0;
        while engine.more_improvements_possible(&probe, 1.0) {
            engine.improve_once(&tree, &mut probe);
            assert!(probe.depth() > last_depth);
            last_depth = probe.depth();
            steps += 1;
            assert!(steps <= 8);
        }
        // Halted because the frontier ran out, not because of a depth cap.
        assert!(probe.frontier().is_none());
        assert!(steps >= 1);
    }

    #[test]
    fn test_refined_score_improves_toward_near_cluster() {
        let tree = two_cluster_tree();
        let engine = scorer(1, 0.05);
        let mut probe = engine.init_probe(&tree, kernel(&[10.0, 10.0])).unwrap();
        let coarse = probe.last_score();
        while engine.more_improvements_possible(&probe, 1.0) {
            engine.improve_once(&tree, &mut probe);
        }
        // Deeper summaries are tighter around the probed point.
        assert!(probe.last_score() <= coarse);
    }

    #[test]
    fn test_aggregation_degenerates_for_k_of_one() {
        let tree = two_cluster_tree();
        let engine = scorer(1, 0.05);
        let mut probe = engine.init_probe(&tree, kernel(&[6.0, 6.0])).unwrap();
        assert!(probe.frontier().is_some());
        while engine.more_improvements_possible(&probe, 1.0) {
            engine.improve_once(&tree, &mut probe);
            assert_eq!(probe.aggregated(), probe.last_score());
        }
    }

    #[test]
    fn test_aggregation_averages_last_k_scores() {
        let tree = two_cluster_tree();
        let engine = scorer(2, 0.05);
        let mut probe = engine.init_probe(&tree, kernel(&[6.0, 6.0])).unwrap();
        assert!(probe.frontier().is_some());
        let first = probe.last_score();
        engine.improve_once(&tree, &mut probe);
        assert!((probe.aggregated() - (first + probe.last_score()) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_dead_branch_keeps_last_score() {
        let tree = two_cluster_tree();
        // Absurd threshold: every entry counts as irrelevant.
        let engine = scorer(2, 1e9);
        let mut probe = engine.init_probe(&tree, kernel(&[10.0, 10.0])).unwrap();
        let score_before = probe.last_score();
        assert!(probe.frontier().is_some());

        engine.improve_once(&tree, &mut probe);
        assert_eq!(probe.depth(), 1);
        assert!(probe.frontier().is_none());
        assert_eq!(probe.last_score(), score_before);
        assert!(!engine.more_improvements_possible(&probe, 1.0));
    }

    #[test]
    fn test_budget_fraction_caps_depth() {
        let tree = two_cluster_tree();
        let engine = scorer(2, 0.05);
        let probe = engine.init_probe(&tree, kernel(&[10.0, 10.0])).unwrap();
        // max_height 8, fraction 0 -> no step allowed even with a frontier.
        assert!(probe.frontier().is_some());
        assert!(!engine.more_improvements_possible(&probe, 0.0));
    }

    #[test]
    fn test_density_score_keeps_dissimilarity_orientation() {
        let summary = {
            let mut k = kernel(&[0.0, 0.0]);
            k.add(&kernel(&[1.0, 1.0]));
            k.add(&kernel(&[0.0, 1.0]));
            k.add(&kernel(&[1.0, 0.0]));
            k
        };
        let near = ScoreFunction::Density.score(&kernel(&[0.5, 0.5]), &summary);
        let far = ScoreFunction::Density.score(&kernel(&[50.0, 50.0]), &summary);
        // Far from the summary the density vanishes and the score approaches 1.
        assert!(far > near);
        assert!((far - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_depth_policy() {
        let policy: DepthPolicy<f64> = DepthPolicy::Fixed(0.75);
        let mut rng = rand::thread_rng();
        assert_eq!(policy.fraction(3, &mut rng), 0.75);
    }

    #[test]
    fn test_uniform_depth_policy_is_clamped() {
        let policy: DepthPolicy<f64> = DepthPolicy::Uniform { min: 0.5, max: 0.9 };
        let mut rng = rand::thread_rng();
        for id in 0..200 {
            let fraction = policy.fraction(id, &mut rng);
            assert!((0.5..=0.9).contains(&fraction));
        }
    }

    #[test]
    fn test_custom_depth_policy_sees_object_id() {
        fn schedule(id: u64) -> f64 {
            if id % 2 == 0 {
                0.25
            } else {
                1.0
            }
        }
        let policy: DepthPolicy<f64> = DepthPolicy::Custom(schedule);
        let mut rng = rand::thread_rng();
        assert_eq!(policy.fraction(2, &mut rng), 0.25);
        assert_eq!(policy.fraction(3, &mut rng), 1.0);
    }
}
