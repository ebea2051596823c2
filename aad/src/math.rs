//! Standard-normal helpers shared by the `Number` overloads.

use once_cell::sync::Lazy;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

static STD_NORMAL: Lazy<Normal> = Lazy::new(|| Normal::new(0.0, 1.0).expect("unit normal"));

/// φ(x), the standard normal density.
#[inline]
pub fn norm_pdf(x: f64) -> f64 {
    STD_NORMAL.pdf(x)
}

/// Φ(x), the standard normal cumulative distribution.
#[inline]
pub fn norm_cdf(x: f64) -> f64 {
    STD_NORMAL.cdf(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_is_symmetric_and_peaks_at_zero() {
        assert!((norm_pdf(0.0) - 0.3989422804014327).abs() < 1e-15);
        assert_eq!(norm_pdf(1.3), norm_pdf(-1.3));
    }

    #[test]
    fn cdf_matches_known_points() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-3);
    }
}
