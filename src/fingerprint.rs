//! Frame fingerprints and change-detection scores
//!
//! A fingerprint is the compact signature of a frame that the selector keeps
//! as its reference. Two strategies are supported:
//!
//! * **Histogram**: 256-bin grayscale intensity histogram, compared by
//!   Pearson correlation (1.0 = identical, lower = more different).
//! * **Blur-diff**: Gaussian-smoothed grayscale grid, compared by mean
//!   absolute difference scaled to [0, 1] (0.0 = identical, higher = more
//!   different).
//!
//! The two scores run in opposite directions; [`FingerprintStrategy::is_new_shot`]
//! hides that so callers only ever ask "is this different enough?".

use std::fmt;
use tracing::trace;
use crate::{
    common::{KeyframeError, Result},
    frame::{gaussian_blur, Frame, GrayImage},
};

/// Number of intensity levels in a histogram fingerprint
pub const HISTOGRAM_BINS: usize = 256;

/// Kernel size used by the blur-diff strategy unless configured otherwise
pub const DEFAULT_BLUR_KERNEL: usize = 21;

/// How frames are reduced to fingerprints and compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintStrategy {
    /// Grayscale histogram compared by correlation
    #[default]
    Histogram,
    /// Smoothed grayscale grid compared by mean absolute difference
    BlurDiff { kernel_size: usize },
}

impl FingerprintStrategy {
    /// Blur-diff with the default 21x21 smoothing kernel
    pub fn blur_diff() -> Self {
        FingerprintStrategy::BlurDiff {
            kernel_size: DEFAULT_BLUR_KERNEL,
        }
    }

    /// Short name for logs and manifests
    pub fn name(&self) -> &'static str {
        match self {
            FingerprintStrategy::Histogram => "histogram",
            FingerprintStrategy::BlurDiff { .. } => "blur-diff",
        }
    }

    /// Reduce a frame to its fingerprint
    pub fn extract(&self, frame: &Frame) -> Fingerprint {
        self.extract_gray(&frame.to_gray())
    }

    /// Fingerprint an already converted grayscale image
    pub fn extract_gray(&self, gray: &GrayImage) -> Fingerprint {
        match *self {
            FingerprintStrategy::Histogram => {
                let mut bins = vec![0u32; HISTOGRAM_BINS];
                for pixel in gray.pixels() {
                    bins[pixel[0] as usize] += 1;
                }
                Fingerprint::Histogram(bins)
            }
            FingerprintStrategy::BlurDiff { kernel_size } => {
                Fingerprint::Smoothed(gaussian_blur(gray, kernel_size))
            }
        }
    }

    /// Raw change-detection score between two fingerprints
    ///
    /// Symmetric in its arguments. The polarity depends on the strategy; see
    /// the module docs.
    ///
    /// # Errors
    /// * `ShapeMismatch` - If the fingerprints come from different strategies,
    ///   different bin counts, or differently sized frames
    pub fn score(&self, reference: &Fingerprint, candidate: &Fingerprint) -> Result<f64> {
        match (reference, candidate) {
            (Fingerprint::Histogram(a), Fingerprint::Histogram(b)) => {
                if a.len() != b.len() {
                    return Err(KeyframeError::shape_mismatch(
                        reference.shape(),
                        candidate.shape(),
                    ));
                }
                Ok(histogram_correlation(a, b))
            }
            (Fingerprint::Smoothed(a), Fingerprint::Smoothed(b)) => {
                if a.dimensions() != b.dimensions() {
                    return Err(KeyframeError::shape_mismatch(
                        reference.shape(),
                        candidate.shape(),
                    ));
                }
                Ok(mean_abs_difference(a, b))
            }
            _ => Err(KeyframeError::shape_mismatch(reference.shape(), candidate.shape())),
        }
    }

    /// Whether `score` means the candidate starts a new shot
    pub fn is_new_shot(&self, score: f64, threshold: f64) -> bool {
        match self {
            FingerprintStrategy::Histogram => score < threshold,
            FingerprintStrategy::BlurDiff { .. } => score > threshold,
        }
    }

    /// The score two identical fingerprints produce
    pub fn identical_score(&self) -> f64 {
        match self {
            FingerprintStrategy::Histogram => 1.0,
            FingerprintStrategy::BlurDiff { .. } => 0.0,
        }
    }
}

impl std::str::FromStr for FingerprintStrategy {
    type Err = KeyframeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "histogram" | "hist" => Ok(FingerprintStrategy::Histogram),
            "blur-diff" | "diff" => Ok(FingerprintStrategy::blur_diff()),
            other => Err(KeyframeError::config_error(format!(
                "Unknown strategy '{}'. Use 'histogram' or 'blur-diff'",
                other
            ))),
        }
    }
}

/// Compact signature of one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Fingerprint {
    /// Pixel counts per intensity level
    Histogram(Vec<u32>),
    /// Denoised intensity grid, same size as the source frame
    Smoothed(GrayImage),
}

impl Fingerprint {
    /// Human-readable shape, used in mismatch errors
    pub fn shape(&self) -> String {
        match self {
            Fingerprint::Histogram(bins) => format!("{}-bin histogram", bins.len()),
            Fingerprint::Smoothed(grid) => format!("{}x{} grid", grid.width(), grid.height()),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shape())
    }
}

/// Pearson correlation between two histograms
///
/// Returns 1.0 when the distributions are identical or when either has zero
/// variance, matching how vision libraries treat a degenerate denominator.
fn histogram_correlation(a: &[u32], b: &[u32]) -> f64 {
    if a == b {
        return 1.0;
    }

    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let (mut num, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        num += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = var_a * var_b;
    let correlation = if denom.abs() > f64::EPSILON {
        num / denom.sqrt()
    } else {
        1.0
    };

    trace!("Histogram correlation: {:.4}", correlation);
    correlation.clamp(-1.0, 1.0)
}

/// Mean absolute pixel difference, scaled to [0, 1]
fn mean_abs_difference(a: &GrayImage, b: &GrayImage) -> f64 {
    let count = a.as_raw().len();
    if count == 0 {
        return 0.0;
    }

    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(x, y)| x[0].abs_diff(y[0]) as u64)
        .sum();

    let diff = total as f64 / count as f64 / 255.0;
    trace!("Mean pixel difference: {:.4} (over {} pixels)", diff, count);
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FrameTimecode;

    fn solid(value: u8, width: u32, height: u32) -> Frame {
        Frame::from_fn(FrameTimecode::new(0, 25.0), width, height, |_, _| [value; 3])
    }

    fn checker(low: u8, high: u8, width: u32, height: u32) -> Frame {
        Frame::from_fn(FrameTimecode::new(0, 25.0), width, height, |x, y| {
            if (x + y) % 2 == 0 { [low; 3] } else { [high; 3] }
        })
    }

    fn gradient(width: u32, height: u32) -> Frame {
        Frame::from_fn(FrameTimecode::new(0, 25.0), width, height, |x, y| {
            [((x * 7 + y * 3) % 256) as u8; 3]
        })
    }

    #[test]
    fn test_histogram_counts_pixels() {
        let fp = FingerprintStrategy::Histogram.extract(&checker(10, 200, 4, 4));
        match fp {
            Fingerprint::Histogram(bins) => {
                assert_eq!(bins.len(), HISTOGRAM_BINS);
                assert_eq!(bins[10], 8);
                assert_eq!(bins[200], 8);
                assert_eq!(bins.iter().sum::<u32>(), 16);
            }
            other => panic!("expected histogram, got {}", other),
        }
    }

    #[test]
    fn test_self_comparison_is_perfect() {
        let frames = [gradient(40, 30), checker(0, 255, 9, 7), solid(0, 1, 1), solid(255, 3, 3)];
        let cases = [(FingerprintStrategy::Histogram, 0.95), (FingerprintStrategy::blur_diff(), 0.3)];
        for (strategy, threshold) in cases {
            for frame in &frames {
                let fp = strategy.extract(frame);
                let score = strategy.score(&fp, &fp).unwrap();
                assert_eq!(score, strategy.identical_score(), "{} on {}", strategy.name(), fp);
                assert!(!strategy.is_new_shot(score, threshold));
            }
        }
    }

    #[test]
    fn test_scores_are_symmetric() {
        let a = gradient(32, 24);
        let b = checker(30, 220, 32, 24);
        for strategy in [FingerprintStrategy::Histogram, FingerprintStrategy::blur_diff()] {
            let fa = strategy.extract(&a);
            let fb = strategy.extract(&b);
            assert_eq!(strategy.score(&fa, &fb).unwrap(), strategy.score(&fb, &fa).unwrap());
        }
    }

    #[test]
    fn test_disjoint_histograms_are_negatively_correlated() {
        let strategy = FingerprintStrategy::Histogram;
        let a = strategy.extract(&checker(0, 255, 8, 8));
        let b = strategy.extract(&checker(60, 190, 8, 8));
        let score = strategy.score(&a, &b).unwrap();

        assert!(score < 0.0);
        assert!(score >= -1.0);
        assert!(strategy.is_new_shot(score, 0.95));
    }

    #[test]
    fn test_flat_histograms_compare_as_identical() {
        // Every bin holds one pixel, so the distribution has zero variance
        let strategy = FingerprintStrategy::Histogram;
        let flat = GrayImage::from_fn(256, 1, |x, _| image::Luma([x as u8]));
        let other = GrayImage::from_pixel(16, 16, image::Luma([7]));
        let score = strategy
            .score(&strategy.extract_gray(&flat), &strategy.extract_gray(&other))
            .unwrap();
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_blur_diff_black_to_white() {
        let strategy = FingerprintStrategy::blur_diff();
        let black = strategy.extract(&solid(0, 16, 16));
        let white = strategy.extract(&solid(255, 16, 16));
        let score = strategy.score(&black, &white).unwrap();

        assert_eq!(score, 1.0);
        assert!(strategy.is_new_shot(score, 0.3));
    }

    #[test]
    fn test_blur_diff_suppresses_pixel_noise() {
        let strategy = FingerprintStrategy::blur_diff();
        let clean = strategy.extract(&solid(128, 40, 40));
        let noisy = strategy.extract(&Frame::from_fn(FrameTimecode::new(1, 25.0), 40, 40, |x, y| {
            if x == 20 && y == 20 { [255; 3] } else { [128; 3] }
        }));
        let score = strategy.score(&clean, &noisy).unwrap();

        assert!(score < 0.01);
        assert!(!strategy.is_new_shot(score, 0.3));
    }

    #[test]
    fn test_shape_mismatch() {
        let diff = FingerprintStrategy::blur_diff();
        let small = diff.extract(&solid(0, 4, 4));
        let large = diff.extract(&solid(0, 8, 4));
        let err = diff.score(&small, &large).unwrap_err();
        assert!(matches!(err, KeyframeError::ShapeMismatch { .. }));
        assert!(err.to_string().contains("4x4 grid"));

        let hist = FingerprintStrategy::Histogram;
        let short = Fingerprint::Histogram(vec![1; 64]);
        let full = hist.extract(&solid(0, 4, 4));
        assert!(matches!(hist.score(&full, &short), Err(KeyframeError::ShapeMismatch { .. })));

        assert!(matches!(hist.score(&full, &small), Err(KeyframeError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_polarity() {
        let hist = FingerprintStrategy::Histogram;
        assert!(hist.is_new_shot(0.5, 0.95));
        assert!(!hist.is_new_shot(0.95, 0.95));
        assert!(!hist.is_new_shot(0.99, 0.95));

        let diff = FingerprintStrategy::blur_diff();
        assert!(diff.is_new_shot(0.5, 0.3));
        assert!(!diff.is_new_shot(0.3, 0.3));
        assert!(!diff.is_new_shot(0.1, 0.3));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("histogram".parse::<FingerprintStrategy>().unwrap(), FingerprintStrategy::Histogram);
        assert_eq!(
            "blur-diff".parse::<FingerprintStrategy>().unwrap(),
            FingerprintStrategy::BlurDiff { kernel_size: 21 }
        );
        assert!("sobel".parse::<FingerprintStrategy>().is_err());
    }
}
