use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use ndarray::Array1;
use num::{Float, FromPrimitive};

/// Numeric epsilon, also the weight floor used when a summary has decayed to
/// (almost) nothing.
pub const EPSILON: f64 = 1e-8;

/// Replacement for per-dimension variances that come out non-positive due to
/// numerical cancellation. Keeps the density score free of divisions by zero.
pub const MIN_VARIANCE: f64 = 1e-50;

/// A cluster-feature summary: per-dimension linear sums, per-dimension squared
/// sums, and a (possibly decayed, hence fractional) weight. One kernel stands
/// in for a group of points; a kernel built from a single point has weight 1.
///
/// # Example
///
/// ```
/// use ndarray::Array1;
/// use anyout::clustree::ClusterKernel;
///
/// let a = ClusterKernel::from_point(&Array1::from_vec(vec![0.0_f64, 0.0]));
/// let b = ClusterKernel::from_point(&Array1::from_vec(vec![3.0_f64, 4.0]));
/// assert!((a.distance(&b) - 5.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct ClusterKernel<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign>
{
    ls: Array1<F>,
    ss: Array1<F>,
    n: F,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> ClusterKernel<F> {
    /// Kernel representing exactly one point.
    pub fn from_point(point: &Array1<F>) -> Self {
        let ss = point.iter().map(|v| *v * *v).collect::<Vec<F>>();
        Self {
            ls: point.clone(),
            ss: Array1::from_vec(ss),
            n: F::one(),
        }
    }

    pub fn dim(&self) -> usize {
        self.ls.len()
    }

    pub fn weight(&self) -> F {
        self.n
    }

    fn safe_weight(&self) -> F {
        self.n.max(F::from_f64(EPSILON).unwrap())
    }

    /// Center of mass, i.e. the linear sums divided by the weight.
    pub fn center(&self) -> Array1<F> {
        let n = self.safe_weight();
        let center = self.ls.iter().map(|v| *v / n).collect::<Vec<F>>();
        Array1::from_vec(center)
    }

    /// Per-dimension variance, `ss/n - (ls/n)^2`. Non-positive results are
    /// lifted to `MIN_VARIANCE` so that downstream density math never divides
    /// by zero.
    pub fn variance_vector(&self) -> Array1<F> {
        let n = self.safe_weight();
        let min_variance = F::from_f64(MIN_VARIANCE).unwrap();
        let variance = self
            .ls
            .iter()
            .zip(self.ss.iter())
            .map(|(ls, ss)| {
                let ls_div_n = *ls / n;
                let v = *ss / n - ls_div_n * ls_div_n;
                if v <= F::zero() {
                    min_variance
                } else {
                    v
                }
            })
            .collect::<Vec<F>>();
        Array1::from_vec(variance)
    }

    /// Euclidean distance between the centers of the two kernels: squared
    /// accumulation over the dimensions, one final square root.
    pub fn distance(&self, other: &Self) -> F {
        let n1 = self.safe_weight();
        let n2 = other.safe_weight();
        let mut sum = F::zero();
        for (a, b) in self.ls.iter().zip(other.ls.iter()) {
            let d = *a / n1 - *b / n2;
            sum += d * d;
        }
        sum.sqrt()
    }

    /// Merge another kernel into this one.
    pub fn add(&mut self, other: &Self) {
        self.n += other.n;
        for (a, b) in self.ls.iter_mut().zip(other.ls.iter()) {
            *a += *b;
        }
        for (a, b) in self.ss.iter_mut().zip(other.ss.iter()) {
            *a += *b;
        }
    }

    /// Age the summary by scaling weight and sums with the given factor in
    /// (0, 1]. The center is invariant under this.
    pub fn scale(&mut self, factor: F) {
        self.n *= factor;
        for v in self.ls.iter_mut() {
            *v *= factor;
        }
        for v in self.ss.iter_mut() {
            *v *= factor;
        }
    }
}
