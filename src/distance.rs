//! Distance metrics used by the local search oracle.
//!
//! Scores are "smaller is closer" for every metric, so ground-truth records
//! and candidate lists can be ordered the same way regardless of metric.
//!
//! | Metric | Score |
//! |--------|-------|
//! | `l2` | $\sum (a_i - b_i)^2$ (squared Euclidean) |
//! | `ip` | $-\langle a,b\rangle$ |
//! | `cosine` | $1 - \cos(a,b)$ |

use std::fmt;
use std::str::FromStr;

const NORM_EPSILON: f32 = 1e-9;

/// Distance metric for dense vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Inner product distance $-\langle a,b\rangle$ (for maximum inner product search).
    InnerProduct,
    /// Cosine distance $1 - \cos(a,b)$.
    Cosine,
}

impl DistanceMetric {
    /// Compute distance between two vectors.
    ///
    /// If dimensions mismatch, this returns `f32::INFINITY` (so it is never selected as a
    /// nearest neighbor).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_squared(a, b),
            DistanceMetric::InnerProduct => inner_product_distance(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "ip" | "inner_product" => Ok(DistanceMetric::InnerProduct),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(format!("unknown metric '{other}' (expected l2, ip or cosine)")),
        }
    }
}

pub use innr::{dot, norm};

/// Squared L2 distance.
#[inline]
#[must_use]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    innr::l2_distance_squared(a, b)
}

/// Inner product distance (negative dot product).
#[inline]
#[must_use]
pub fn inner_product_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    -dot(a, b)
}

/// Cosine distance $1 - \cos(a,b)$.
///
/// Zero vectors have distance 1 to everything.
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    if norm(a) <= NORM_EPSILON || norm(b) <= NORM_EPSILON {
        return 1.0;
    }
    1.0 - innr::cosine(a, b).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_is_squared() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(DistanceMetric::L2.distance(&[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_distance_is_zero_for_identical() {
        let a = [1.0_f32, 2.0, 3.0];
        let d = cosine_distance(&a, &a);
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn zero_vector_cosine_is_one() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 2.0]), 1.0);
        assert_eq!(DistanceMetric::Cosine.distance(&[3.0], &[0.0]), 1.0);
    }

    #[test]
    fn kernels_agree_with_scalar_sums_on_long_vectors() {
        let a: Vec<f32> = (0..67).map(|i| (i as f32 * 0.37).sin()).collect();
        let b: Vec<f32> = (0..67).map(|i| (i as f32 * 0.11).cos()).collect();
        let l2: f32 = a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum();
        let ip: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((l2_squared(&a, &b) - l2).abs() < 1e-3);
        assert!((inner_product_distance(&a, &b) + ip).abs() < 1e-3);
        let cos = ip / (norm(&a) * norm(&b));
        assert!((cosine_distance(&a, &b) - (1.0 - cos)).abs() < 1e-4);
    }

    #[test]
    fn inner_product_prefers_aligned() {
        let q = [1.0_f32, 0.0];
        assert!(inner_product_distance(&q, &[2.0, 0.0]) < inner_product_distance(&q, &[0.0, 2.0]));
    }

    #[test]
    fn dimension_mismatch_is_infinite() {
        for m in [DistanceMetric::L2, DistanceMetric::InnerProduct, DistanceMetric::Cosine] {
            assert_eq!(m.distance(&[1.0], &[1.0, 2.0]), f32::INFINITY);
        }
    }

    #[test]
    fn parse_names() {
        assert_eq!("L2".parse::<DistanceMetric>(), Ok(DistanceMetric::L2));
        assert_eq!("ip".parse::<DistanceMetric>(), Ok(DistanceMetric::InnerProduct));
        assert_eq!("cosine".parse::<DistanceMetric>(), Ok(DistanceMetric::Cosine));
        assert!("hamming".parse::<DistanceMetric>().is_err());
    }
}
