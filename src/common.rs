use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use ndarray::Array1;
use num::{Float, FromPrimitive};
use thiserror::Error;

/// Enum for ground-truth labels attached to stream objects, supporting boolean,
/// integer, and string classes.
///
/// # Example
///
/// ```
/// use anyout::common::Label;
///
/// let label_bool = Label::Bool(true);
/// let label_int = Label::from(1);
/// let label_string = Label::from("outlier");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    Bool(bool),
    Int(i32),
    String(String),
}

impl From<bool> for Label {
    fn from(v: bool) -> Self {
        Label::Bool(v)
    }
}

impl From<i32> for Label {
    fn from(v: i32) -> Self {
        Label::Int(v)
    }
}

impl From<String> for Label {
    fn from(v: String) -> Self {
        Label::String(v)
    }
}

impl From<&str> for Label {
    fn from(v: &str) -> Self {
        Label::String(v.to_string())
    }
}

/// One arriving point of the stream: a dense feature vector, the monotonically
/// increasing identifier assigned on arrival, and an optional ground-truth
/// label. The outlier flag is owned by the sliding-window registry and only
/// changes through it.
#[derive(Debug, Clone)]
pub struct StreamObject<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> {
    pub id: u64,
    pub features: Array1<F>,
    pub label: Option<Label>,
    pub(crate) outlier: bool,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> StreamObject<F> {
    pub fn new(id: u64, features: Array1<F>, label: Option<Label>) -> Self {
        Self {
            id,
            features,
            label,
            outlier: false,
        }
    }

    pub fn is_flagged_outlier(&self) -> bool {
        self.outlier
    }
}

/// Errors surfaced by the detector and the tree. A dimensionality mismatch is
/// a precondition violation: letting it through would corrupt every distance
/// computed afterwards, so it fails the call instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnyOutError {
    #[error("feature dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from() {
        assert_eq!(Label::from(true), Label::Bool(true));
        assert_eq!(Label::from(3), Label::Int(3));
        assert_eq!(Label::from("cat"), Label::String("cat".to_string()));
    }

    #[test]
    fn test_stream_object_starts_unflagged() {
        let obj: StreamObject<f64> =
            StreamObject::new(7, Array1::from_vec(vec![1.0, 2.0]), Some(Label::from(1)));
        assert_eq!(obj.id, 7);
        assert!(!obj.is_flagged_outlier());
    }
}
