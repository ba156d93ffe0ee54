use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use log::info;
use ndarray::Array1;
use num::{Float, FromPrimitive};
use rand::prelude::*;

use crate::clustree::{ClusTree, ClusterKernel};
use crate::common::{AnyOutError, Label, StreamObject};
use crate::metrics::detection::DetectionStats;

use super::confidence::ConfidenceCombination;
use super::scorer::{AnytimeScorer, DepthPolicy, ProbeState, ScoreFunction};
use super::training::TrainingPhase;
use super::window::{NoopObserver, OutlierObserver, SlidingWindow};

/// Configuration of the detector.
///
/// # Parameters
///
/// - `window_size`: The number of most recent objects kept live and
///   re-evaluated.
/// - `training_set_size`: The number of leading objects buffered and
///   bulk-inserted into the tree before online scoring starts. 0 means cold
///   start.
/// - `score_k`: The number of most recent raw scores folded into the moving
///   average; 1 keeps the latest score alone.
/// - `conf_k`: The number of scores the confidence estimators look back over.
/// - `confidence_choice`: Which confidence signal (or product of signals)
///   divides the score.
/// - `weight_threshold`: Summaries below this weight mark a dead branch.
/// - `threshold`: An object is flagged while `score / confidence` exceeds it.
/// - `score_function`: Distance- or density-based dissimilarity.
/// - `max_height`: The nominal maximal height of the tree.
/// - `depth_policy`: The per-object depth budget fraction.
/// - `outlier_label`: The ground-truth label counted as a real outlier in the
///   statistics; `None` disables them.
pub struct AnyOutParams<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> {
    pub window_size: usize,
    pub training_set_size: usize,
    pub score_k: usize,
    pub conf_k: usize,
    pub confidence_choice: ConfidenceCombination,
    pub weight_threshold: F,
    pub threshold: F,
    pub score_function: ScoreFunction,
    pub max_height: usize,
    pub depth_policy: DepthPolicy<F>,
    pub outlier_label: Option<Label>,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> Default
    for AnyOutParams<F>
{
    fn default() -> Self {
        Self {
            window_size: 1000,
            training_set_size: 1000,
            score_k: 2,
            conf_k: 2,
            confidence_choice: ConfidenceCombination::StabilityMagnitude,
            weight_threshold: F::from_f64(0.05).unwrap(),
            threshold: F::from_f64(0.07).unwrap(),
            score_function: ScoreFunction::Distance,
            max_height: 8,
            depth_policy: DepthPolicy::Uniform {
                min: F::from_f64(0.5).unwrap(),
                max: F::from_f64(0.9).unwrap(),
            },
            outlier_label: None,
        }
    }
}

/// Anytime outlier detection over a stream of dense feature vectors.
///
/// Each arriving object is scored against an online cluster-feature tree by
/// descending it level by level under a per-object depth budget; stopping
/// early is always legal and only costs precision, never validity. The score
/// is divided by a confidence estimate before it faces the threshold, every
/// scored object is learned into the tree, and a sliding window of the most
/// recent objects is re-evaluated after each arrival.
///
/// # Example
///
/// ```
/// use ndarray::Array1;
/// use anyout::anomaly::confidence::ConfidenceCombination;
/// use anyout::anomaly::detector::{AnyOut, AnyOutParams};
/// use anyout::anomaly::scorer::DepthPolicy;
///
/// let params = AnyOutParams {
///     window_size: 10,
///     training_set_size: 2,
///     confidence_choice: ConfidenceCombination::Magnitude,
///     depth_policy: DepthPolicy::Fixed(1.0),
///     ..AnyOutParams::default()
/// };
/// let mut detector: AnyOut<f64> = AnyOut::new(params);
/// for point in [[0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [8.0, 8.0]] {
///     detector
///         .process_one(Array1::from_vec(point.to_vec()), None)
///         .unwrap();
/// }
/// assert!(detector.outlier_score(3).unwrap() > detector.outlier_score(2).unwrap());
/// ```
pub struct AnyOut<
    F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign,
    O: OutlierObserver<F> = NoopObserver,
> {
    tree: ClusTree<F>,
    training: TrainingPhase<F>,
    scorer: AnytimeScorer<F>,
    window: SlidingWindow<F>,
    observer: O,
    stats: DetectionStats,
    depth_policy: DepthPolicy<F>,
    threshold: F,
    outlier_label: Option<Label>,
    next_id: u64,
    rng: ThreadRng,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> AnyOut<F> {
    pub fn new(params: AnyOutParams<F>) -> Self {
        Self::with_observer(params, NoopObserver)
    }
}

impl<
        F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign,
        O: OutlierObserver<F>,
    > AnyOut<F, O>
{
    pub fn with_observer(params: AnyOutParams<F>, observer: O) -> Self {
        let tree = ClusTree::new(
            params.max_height,
            params.window_size,
            params.weight_threshold,
        );
        let scorer = AnytimeScorer::new(
            params.score_function,
            params.confidence_choice,
            params.score_k,
            params.conf_k,
            params.weight_threshold,
            params.max_height,
        );
        Self {
            tree,
            training: TrainingPhase::new(params.training_set_size),
            scorer,
            window: SlidingWindow::new(params.window_size),
            observer,
            stats: DetectionStats::new(),
            depth_policy: params.depth_policy,
            threshold: params.threshold,
            outlier_label: params.outlier_label,
            next_id: 0,
            rng: rand::thread_rng(),
        }
    }

    /// Process one arriving feature vector to completion: training buffer or
    /// anytime scoring, online learning, and re-evaluation of the whole
    /// window. Returns the id assigned to the object.
    pub fn process_one(
        &mut self,
        features: Array1<F>,
        label: Option<Label>,
    ) -> Result<u64, AnyOutError> {
        let id = self.next_id;
        self.next_id += 1;

        if self.training.try_buffer(&features)? {
            return Ok(id);
        }
        if self.training.is_ready() {
            let buffered = self.training.drain();
            info!(
                "training phase over, bulk-inserting {} vectors",
                buffered.len()
            );
            for vector in &buffered {
                self.tree.insert(ClusterKernel::from_point(vector))?;
            }
        }

        let kernel = ClusterKernel::from_point(&features);
        let probe = self.scorer.init_probe(&self.tree, kernel.clone())?;

        let object = StreamObject::new(id, features, label);
        if let (Some(designated), Some(label)) = (&self.outlier_label, &object.label) {
            if designated == label {
                self.stats.record_ground_truth();
            }
        }
        self.window.admit(object, probe, &mut self.observer);

        // Refine while the per-object budget allows it.
        let fraction = self.depth_policy.fraction(id, &mut self.rng);
        if let Some(slot) = self.window.get_mut(id) {
            while self.scorer.more_improvements_possible(&slot.probe, fraction) {
                self.scorer.improve_once(&self.tree, &mut slot.probe);
            }
        }

        // Online learning: every processed object feeds future summaries, no
        // matter how briefly it was examined.
        self.tree.insert(kernel)?;

        self.reevaluate_window();
        Ok(id)
    }

    /// Re-check the outlier predicate for every live object. The registry
    /// owns all flag transitions, so both directions run through it.
    fn reevaluate_window(&mut self) {
        let ids: Vec<u64> = self.window.ids().collect();
        for id in ids {
            let (flagged, was_flagged, true_positive) = match self.window.get(id) {
                Some(slot) => (
                    self.decide(&slot.probe),
                    slot.object.is_flagged_outlier(),
                    match (&self.outlier_label, &slot.object.label) {
                        (Some(designated), Some(label)) => designated == label,
                        _ => false,
                    },
                ),
                None => continue,
            };
            if flagged {
                if !was_flagged {
                    if self.outlier_label.is_some() {
                        self.stats.record_flag(true_positive);
                    }
                    self.window.flag(id, &mut self.observer);
                }
            } else {
                self.window.unflag(id, &mut self.observer);
            }
        }
    }

    fn decide(&self, probe: &ProbeState<F>) -> bool {
        probe.aggregated() / probe.confidence() > self.threshold
    }

    /// Whether the given live object is currently flagged. Ids outside the
    /// window are never outliers.
    pub fn is_outlier(&self, id: u64) -> bool {
        match self.window.get(id) {
            Some(slot) => self.decide(&slot.probe),
            None => false,
        }
    }

    /// The confidence-weighted outlier score, `aggregated / confidence`.
    pub fn outlier_score(&self, id: u64) -> Option<F> {
        self.window
            .get(id)
            .map(|slot| slot.probe.aggregated() / slot.probe.confidence())
    }

    pub fn confidence(&self, id: u64) -> Option<F> {
        self.window.get(id).map(|slot| slot.probe.confidence())
    }

    pub fn probe(&self, id: u64) -> Option<&ProbeState<F>> {
        self.window.get(id).map(|slot| &slot.probe)
    }

    /// Ids currently flagged, ascending.
    pub fn outliers(&self) -> Vec<u64> {
        self.window.outliers().collect()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn stats(&self) -> &DetectionStats {
        &self.stats
    }

    pub fn tree(&self) -> &ClusTree<F> {
        &self.tree
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }
}
