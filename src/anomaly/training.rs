use std::mem;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use ndarray::Array1;
use num::{Float, FromPrimitive};

use crate::common::AnyOutError;

/// Buffers the first `target` feature vectors of the stream so the tree can be
/// initialized in one bulk pass. Labels and ids are not kept; training data
/// only shapes the summaries. After the one flush the controller is disabled
/// for good, and a target of 0 disables it from the start (cold start on an
/// empty tree).
pub struct TrainingPhase<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign>
{
    buffer: Vec<Array1<F>>,
    target: usize,
    active: bool,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> TrainingPhase<F> {
    pub fn new(target: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(target),
            target,
            active: target > 0,
        }
    }

    /// Returns true if the vector was swallowed by the training buffer, false
    /// once the training phase is over (or was never on).
    pub fn try_buffer(&mut self, features: &Array1<F>) -> Result<bool, AnyOutError> {
        if !self.active || self.buffer.len() >= self.target {
            return Ok(false);
        }
        if let Some(first) = self.buffer.first() {
            if first.len() != features.len() {
                return Err(AnyOutError::DimensionMismatch {
                    expected: first.len(),
                    found: features.len(),
                });
            }
        }
        self.buffer.push(features.clone());
        Ok(true)
    }

    /// True exactly once: when the buffer is full and has not been drained.
    pub fn is_ready(&self) -> bool {
        self.active && self.buffer.len() >= self.target
    }

    /// Hand out the buffered vectors and disable the controller permanently.
    pub fn drain(&mut self) -> Vec<Array1<F>> {
        self.active = false;
        mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f64]) -> Array1<f64> {
        Array1::from_vec(values.to_vec())
    }

    #[test]
    fn test_buffers_until_target() {
        let mut training: TrainingPhase<f64> = TrainingPhase::new(2);
        assert!(training.try_buffer(&vector(&[0.0, 0.0])).unwrap());
        assert!(!training.is_ready());
        assert!(training.try_buffer(&vector(&[1.0, 1.0])).unwrap());
        assert!(training.is_ready());

        // The object arriving after the buffer filled up is not swallowed; it
        // triggers the flush and goes down the online path itself.
        assert!(!training.try_buffer(&vector(&[2.0, 2.0])).unwrap());
        let drained = training.drain();
        assert_eq!(drained.len(), 2);

        // Disabled for good.
        assert!(!training.is_ready());
        assert!(!training.try_buffer(&vector(&[3.0, 3.0])).unwrap());
        assert!(training.drain().is_empty());
    }

    #[test]
    fn test_zero_target_is_cold_start() {
        let mut training: TrainingPhase<f64> = TrainingPhase::new(0);
        assert!(!training.try_buffer(&vector(&[0.0])).unwrap());
        assert!(!training.is_ready());
    }

    #[test]
    fn test_rejects_mixed_dimensions() {
        let mut training: TrainingPhase<f64> = TrainingPhase::new(5);
        training.try_buffer(&vector(&[0.0, 0.0])).unwrap();
        let err = training.try_buffer(&vector(&[0.0])).unwrap_err();
        assert_eq!(
            err,
            AnyOutError::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
    }
}
