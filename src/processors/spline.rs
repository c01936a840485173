//! Natural cubic spline through the silhouette.
//!
//! The spline interpolates every sample exactly and has continuous first and
//! second derivatives. The dip expander walks along it and reads its slope.

use crate::core::types::{DetectionError, Result, Silhouette};

/// Largest grid [`CubicSpline::resample`] will build.
pub const MAX_RESAMPLE_POINTS: usize = 10_000_000;

/// Interpolating cubic spline with natural end conditions (zero curvature
/// at both ends).
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    /// Second derivative at each knot
    moments: Vec<f64>,
}

impl CubicSpline {
    /// Fit a spline through `(knots[i], values[i])`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidDomain`] for fewer than two samples,
    /// mismatched lengths, non-finite values, or knots that do not strictly
    /// increase.
    pub fn new(knots: &[f64], values: &[f64]) -> Result<Self> {
        let n = knots.len();
        if n != values.len() {
            return Err(DetectionError::InvalidDomain(format!(
                "{} knots but {} values",
                n,
                values.len()
            )));
        }
        if n < 2 {
            return Err(DetectionError::InvalidDomain(format!(
                "need at least 2 distinct positions, got {}",
                n
            )));
        }
        if knots.iter().chain(values).any(|v| !v.is_finite()) {
            return Err(DetectionError::InvalidDomain(
                "non-finite sample in spline input".to_string(),
            ));
        }
        if let Some(i) = knots.windows(2).position(|w| w[1] <= w[0]) {
            return Err(DetectionError::InvalidDomain(format!(
                "knots not strictly increasing at index {} ({} -> {})",
                i + 1,
                knots[i],
                knots[i + 1]
            )));
        }

        let moments = solve_moments(knots, values);
        Ok(Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            moments,
        })
    }

    /// Lower and upper end of the domain.
    #[inline]
    pub fn domain(&self) -> (f64, f64) {
        (self.knots[0], self.knots[self.knots.len() - 1])
    }

    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        let (lo, hi) = self.domain();
        x >= lo && x <= hi
    }

    /// Spline value at `x`, or `None` outside the domain.
    pub fn value(&self, x: f64) -> Option<f64> {
        if !self.contains(x) {
            return None;
        }
        let seg = self.segment(x);
        let (a, b, h) = seg.offsets(x);
        Some(
            seg.m0 * a.powi(3) / (6.0 * h)
                + seg.m1 * b.powi(3) / (6.0 * h)
                + (seg.y0 / h - seg.m0 * h / 6.0) * a
                + (seg.y1 / h - seg.m1 * h / 6.0) * b,
        )
    }

    /// First derivative at `x`, or `None` outside the domain.
    pub fn derivative(&self, x: f64) -> Option<f64> {
        if !self.contains(x) {
            return None;
        }
        let seg = self.segment(x);
        let (a, b, h) = seg.offsets(x);
        Some(
            -seg.m0 * a * a / (2.0 * h) + seg.m1 * b * b / (2.0 * h)
                + (seg.y1 - seg.y0) / h
                - (seg.m1 - seg.m0) * h / 6.0,
        )
    }

    /// Evaluate the spline on an evenly spaced grid starting at the lower
    /// end of the domain. The upper end is included only when it falls on
    /// the grid.
    pub fn resample(&self, step: f64) -> Result<Silhouette> {
        if !(step.is_finite() && step > 0.0) {
            return Err(DetectionError::InvalidDomain(format!(
                "resample step must be positive, got {}",
                step
            )));
        }
        let (lo, hi) = self.domain();
        let intervals = ((hi - lo) / step).floor();
        if intervals >= MAX_RESAMPLE_POINTS as f64 {
            return Err(DetectionError::InvalidDomain(format!(
                "resample step {} over [{}, {}] exceeds {} samples",
                step, lo, hi, MAX_RESAMPLE_POINTS
            )));
        }
        let count = intervals as usize + 1;

        let mut positions = Vec::with_capacity(count);
        let mut heights = Vec::with_capacity(count);
        for i in 0..count {
            let x = (lo + i as f64 * step).min(hi);
            if let Some(y) = self.value(x) {
                positions.push(x);
                heights.push(y);
            }
        }
        Silhouette::new(positions, heights)
    }

    fn segment(&self, x: f64) -> Segment {
        let last = self.knots.len() - 2;
        let i = self.knots.partition_point(|&k| k <= x).saturating_sub(1).min(last);
        Segment {
            x0: self.knots[i],
            x1: self.knots[i + 1],
            y0: self.values[i],
            y1: self.values[i + 1],
            m0: self.moments[i],
            m1: self.moments[i + 1],
        }
    }
}

struct Segment {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    m0: f64,
    m1: f64,
}

impl Segment {
    /// Distances to the right and left knot, and the segment width.
    #[inline]
    fn offsets(&self, x: f64) -> (f64, f64, f64) {
        (self.x1 - x, x - self.x0, self.x1 - self.x0)
    }
}

/// Second derivatives at the knots, natural boundary, via the Thomas algorithm.
fn solve_moments(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut moments = vec![0.0; n];
    if n < 3 {
        return moments;
    }

    let m = n - 2;
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Tridiagonal system for moments[1..n-1]
    let mut diag = vec![0.0; m];
    let mut upper = vec![0.0; m];
    let mut rhs = vec![0.0; m];
    for k in 0..m {
        let i = k + 1;
        diag[k] = 2.0 * (h[i - 1] + h[i]);
        upper[k] = h[i];
        rhs[k] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
    }

    // Forward sweep; the sub-diagonal entry of row k is h[k]
    for k in 1..m {
        let w = h[k] / diag[k - 1];
        diag[k] -= w * upper[k - 1];
        rhs[k] -= w * rhs[k - 1];
    }

    moments[m] = rhs[m - 1] / diag[m - 1];
    for k in (0..m - 1).rev() {
        moments[k + 1] = (rhs[k] - upper[k] * moments[k + 2]) / diag[k];
    }

    moments
}

/// Fit the frame's spline through the full silhouette.
pub fn fit_curve(silhouette: &Silhouette) -> Result<CubicSpline> {
    CubicSpline::new(silhouette.positions(), silhouette.heights())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn wavy() -> (Vec<f64>, Vec<f64>) {
        let x = vec![0.0, 0.3, 0.5, 1.1, 1.4, 2.0, 2.2, 3.0];
        let y = x.iter().map(|v: &f64| (v * 2.0).sin() + 0.1 * v).collect();
        (x, y)
    }

    #[test]
    fn test_passes_through_samples() {
        let (x, y) = wavy();
        let spline = CubicSpline::new(&x, &y).unwrap();
        for (xi, yi) in x.iter().zip(&y) {
            assert_abs_diff_eq!(spline.value(*xi).unwrap(), *yi, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_reproduces_straight_line() {
        let x = vec![0.0, 0.5, 0.7, 2.0, 3.5];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v - 1.0).collect();
        let spline = CubicSpline::new(&x, &y).unwrap();

        for t in [0.0, 0.1, 0.6, 1.3, 3.5] {
            assert_abs_diff_eq!(spline.value(t).unwrap(), 2.0 * t - 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(spline.derivative(t).unwrap(), 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_first_derivative_continuous_at_knots() {
        let (x, y) = wavy();
        let spline = CubicSpline::new(&x, &y).unwrap();
        let d = 1e-7;
        for &k in &x[1..x.len() - 1] {
            let left = spline.derivative(k - d).unwrap();
            let right = spline.derivative(k + d).unwrap();
            assert_abs_diff_eq!(left, right, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let (x, y) = wavy();
        let spline = CubicSpline::new(&x, &y).unwrap();
        let d = 1e-6;
        for t in [0.2, 0.9, 1.7, 2.6] {
            let fd = (spline.value(t + d).unwrap() - spline.value(t - d).unwrap()) / (2.0 * d);
            assert_abs_diff_eq!(spline.derivative(t).unwrap(), fd, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_outside_domain_is_none() {
        let spline = CubicSpline::new(&[0.0, 1.0], &[0.0, 1.0]).unwrap();
        assert!(spline.value(-0.01).is_none());
        assert!(spline.derivative(1.01).is_none());
        assert_eq!(spline.value(1.0), Some(1.0));
    }

    #[test]
    fn test_invalid_domain() {
        assert!(matches!(
            CubicSpline::new(&[1.0], &[0.0]),
            Err(DetectionError::InvalidDomain(_))
        ));
        assert!(matches!(
            CubicSpline::new(&[0.0, 1.0, 1.0], &[0.0, 0.0, 0.0]),
            Err(DetectionError::InvalidDomain(_))
        ));
        assert!(matches!(
            CubicSpline::new(&[0.0, 2.0, 1.0], &[0.0, 0.0, 0.0]),
            Err(DetectionError::InvalidDomain(_))
        ));
        assert!(matches!(
            fit_curve(&Silhouette::empty()),
            Err(DetectionError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_resample_even_grid() {
        let spline = CubicSpline::new(&[0.0, 0.25, 1.0], &[0.0, 0.5, 0.0]).unwrap();
        let resampled = spline.resample(0.1).unwrap();

        assert_eq!(resampled.len(), 11);
        assert_abs_diff_eq!(resampled.positions()[0], 0.0);
        for w in resampled.positions().windows(2) {
            assert_abs_diff_eq!(w[1] - w[0], 0.1, epsilon = 1e-12);
        }
        assert!(spline.resample(0.0).is_err());
    }

    #[test]
    fn test_resample_rejects_oversized_grid() {
        let spline = CubicSpline::new(&[0.0, 1.0], &[0.0, 1.0]).unwrap();
        assert!(matches!(
            spline.resample(1e-300),
            Err(DetectionError::InvalidDomain(_))
        ));
        assert!(matches!(
            spline.resample(f64::MIN_POSITIVE),
            Err(DetectionError::InvalidDomain(_))
        ));
    }
}
