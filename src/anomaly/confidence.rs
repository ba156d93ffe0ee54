use std::collections::VecDeque;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use num::{Float, FromPrimitive};

/// Which of the three confidence signals (or which product of them) turns the
/// raw anytime score into a trust-weighted one. The numbering matches the
/// classic configuration surface: 1 = stability, 2 = magnitude, 3 = depth
/// progress, 4-7 the pairwise and triple products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceCombination {
    Stability,
    Magnitude,
    DepthProgress,
    StabilityMagnitude,
    StabilityDepth,
    MagnitudeDepth,
    All,
}

impl ConfidenceCombination {
    /// Maps the numeric configuration choice 1-7 onto a combination.
    pub fn from_choice(choice: u8) -> Option<Self> {
        match choice {
            1 => Some(ConfidenceCombination::Stability),
            2 => Some(ConfidenceCombination::Magnitude),
            3 => Some(ConfidenceCombination::DepthProgress),
            4 => Some(ConfidenceCombination::StabilityMagnitude),
            5 => Some(ConfidenceCombination::StabilityDepth),
            6 => Some(ConfidenceCombination::MagnitudeDepth),
            7 => Some(ConfidenceCombination::All),
            _ => None,
        }
    }

    pub(crate) fn evaluate<F>(
        &self,
        last_score: F,
        history: &VecDeque<F>,
        depth: usize,
        conf_k: usize,
        height: usize,
        max_height: usize,
    ) -> F
    where
        F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign,
    {
        match self {
            ConfidenceCombination::Stability => stability(last_score, history, conf_k),
            ConfidenceCombination::Magnitude => magnitude(last_score, history, conf_k),
            ConfidenceCombination::DepthProgress => depth_progress(depth, height, max_height),
            ConfidenceCombination::StabilityMagnitude => {
                stability(last_score, history, conf_k) * magnitude(last_score, history, conf_k)
            }
            ConfidenceCombination::StabilityDepth => {
                stability(last_score, history, conf_k) * depth_progress(depth, height, max_height)
            }
            ConfidenceCombination::MagnitudeDepth => {
                magnitude(last_score, history, conf_k) * depth_progress(depth, height, max_height)
            }
            ConfidenceCombination::All => {
                stability(last_score, history, conf_k)
                    * magnitude(last_score, history, conf_k)
                    * depth_progress(depth, height, max_height)
            }
        }
    }
}

/// C1: `exp(-mean |delta|)` over the differences between consecutive scores,
/// looking at the last `conf_k` scores (current one included). With no prior
/// score there is nothing to be stable against, so the signal is 0.
pub(crate) fn stability<F>(last_score: F, history: &VecDeque<F>, conf_k: usize) -> F
where
    F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign,
{
    let n = history.len();
    if n == 0 {
        return F::zero();
    }
    let mut count = 1;
    let mut dif_sum = (last_score - history[n - 1]).abs();
    let lo = n.saturating_sub(conf_k.saturating_sub(1)) + 1;
    for i in lo..n {
        dif_sum += (history[i] - history[i - 1]).abs();
        count += 1;
    }
    dif_sum /= F::from_usize(count).unwrap();
    (-dif_sum).exp()
}

/// C2: `exp(-mean score)` over the last `conf_k` scores including the current
/// one. Small scores mean the object sits close to some summary, which makes
/// the score trustworthy.
pub(crate) fn magnitude<F>(last_score: F, history: &VecDeque<F>, conf_k: usize) -> F
where
    F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign,
{
    let n = history.len();
    let mut count = 1;
    let mut sum = last_score;
    for i in n.saturating_sub(conf_k.saturating_sub(1))..n {
        sum += history[i];
        count += 1;
    }
    sum /= F::from_usize(count).unwrap();
    (-sum).exp()
}

/// C3: fraction of the tree already descended. Falls back to the nominal
/// maximal height while the tree reports height 0.
pub(crate) fn depth_progress<F>(depth: usize, height: usize, max_height: usize) -> F
where
    F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign,
{
    let effective = if height == 0 { max_height } else { height };
    F::from_usize(depth).unwrap() / F::from_usize(effective).unwrap()
}
