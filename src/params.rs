//! Selection parameters and presets
//!
//! One immutable `SelectionParameters` value configures a run: the
//! fingerprint strategy, the similarity threshold, the optional blur
//! threshold and the sampling stride. Presets reproduce the four tool
//! configurations the selector grew out of.

use tracing::debug;
use crate::{
    common::{KeyframeError, Result},
    fingerprint::FingerprintStrategy,
};

/// Which decoded frames become candidates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Sampling {
    /// Evaluate every decoded frame
    #[default]
    EveryFrame,
    /// Evaluate every Nth frame
    EveryNth(u64),
    /// Evaluate one frame per interval, in seconds
    Interval(f64),
}

impl Sampling {
    /// Frame stride for a video at `fps`, never less than 1
    ///
    /// Intervals resolve to `round(fps * seconds)`.
    pub fn stride(&self, fps: f64) -> u64 {
        match *self {
            Sampling::EveryFrame => 1,
            Sampling::EveryNth(n) => n.max(1),
            Sampling::Interval(seconds) => {
                let frames = (fps * seconds).round();
                if frames.is_finite() && frames >= 1.0 {
                    frames as u64
                } else {
                    1
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Sampling::EveryNth(0) => Err(KeyframeError::config_error(
                "Frame stride must be at least 1",
            )),
            Sampling::Interval(seconds) if !(seconds.is_finite() && seconds > 0.0) => {
                Err(KeyframeError::config_error(format!(
                    "Sampling interval must be a positive number of seconds, got: {}",
                    seconds
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Named parameter sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Blur-diff every frame, diff > 0.3, no blur filter
    FrameDiff,
    /// Histogram every `interval` seconds, correlation < 0.95, blur >= 100
    Interval,
    /// Histogram once per second, correlation < 0.95, blur >= 80
    PerSecond,
    /// Histogram every 3rd frame, correlation < 0.85, blur >= 70
    EveryThird,
}

impl std::str::FromStr for Preset {
    type Err = KeyframeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "frame-diff" | "diff" => Ok(Preset::FrameDiff),
            "interval" => Ok(Preset::Interval),
            "per-second" => Ok(Preset::PerSecond),
            "every-third" => Ok(Preset::EveryThird),
            other => Err(KeyframeError::config_error(format!(
                "Unknown preset '{}'. Use 'frame-diff', 'interval', 'per-second' or 'every-third'",
                other
            ))),
        }
    }
}

/// Configuration for one selection run
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionParameters {
    pub strategy: FingerprintStrategy,
    /// Correlation floor (histogram) or difference ceiling (blur-diff)
    pub similarity_threshold: f64,
    /// Minimum Laplacian variance; `None` disables the blur filter
    pub blur_threshold: Option<f64>,
    pub sampling: Sampling,
    /// Accept the first sampled frame even if it is blurry
    pub force_first_frame: bool,
}

impl Default for SelectionParameters {
    fn default() -> Self {
        Self::from_preset(Preset::PerSecond)
    }
}

impl SelectionParameters {
    /// Build and validate a parameter set
    pub fn new(
        strategy: FingerprintStrategy,
        similarity_threshold: f64,
        blur_threshold: Option<f64>,
        sampling: Sampling,
    ) -> Result<Self> {
        let params = Self {
            strategy,
            similarity_threshold,
            blur_threshold,
            sampling,
            force_first_frame: false,
        };
        params.validate()?;

        debug!("Created SelectionParameters: {:?}", params);
        Ok(params)
    }

    /// Parameters of a named preset
    ///
    /// `Preset::Interval` starts at one second; use [`with_sampling`](Self::with_sampling)
    /// to change it.
    pub fn from_preset(preset: Preset) -> Self {
        let (strategy, similarity_threshold, blur_threshold, sampling) = match preset {
            Preset::FrameDiff => (FingerprintStrategy::blur_diff(), 0.3, None, Sampling::EveryFrame),
            Preset::Interval => (FingerprintStrategy::Histogram, 0.95, Some(100.0), Sampling::Interval(1.0)),
            Preset::PerSecond => (FingerprintStrategy::Histogram, 0.95, Some(80.0), Sampling::Interval(1.0)),
            Preset::EveryThird => (FingerprintStrategy::Histogram, 0.85, Some(70.0), Sampling::EveryNth(3)),
        };

        Self {
            strategy,
            similarity_threshold,
            blur_threshold,
            sampling,
            force_first_frame: false,
        }
    }

    pub fn with_strategy(mut self, strategy: FingerprintStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_blur_threshold(mut self, threshold: Option<f64>) -> Self {
        self.blur_threshold = threshold;
        self
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_force_first_frame(mut self, force: bool) -> Self {
        self.force_first_frame = force;
        self
    }

    /// Check that thresholds and sampling are usable
    pub fn validate(&self) -> Result<()> {
        if !self.similarity_threshold.is_finite() {
            return Err(KeyframeError::config_error(format!(
                "Similarity threshold must be finite, got: {}",
                self.similarity_threshold
            )));
        }

        match self.strategy {
            FingerprintStrategy::Histogram if !(-1.0..=1.0).contains(&self.similarity_threshold) => {
                return Err(KeyframeError::config_error(format!(
                    "Histogram correlation threshold must be within [-1, 1], got: {}",
                    self.similarity_threshold
                )));
            }
            FingerprintStrategy::BlurDiff { .. } if !(0.0..=1.0).contains(&self.similarity_threshold) => {
                return Err(KeyframeError::config_error(format!(
                    "Blur-diff threshold must be within [0, 1], got: {}",
                    self.similarity_threshold
                )));
            }
            FingerprintStrategy::BlurDiff { kernel_size } if kernel_size % 2 == 0 => {
                return Err(KeyframeError::config_error(format!(
                    "Blur kernel size must be odd, got: {}",
                    kernel_size
                )));
            }
            _ => {}
        }

        if let Some(blur) = self.blur_threshold {
            if !(blur.is_finite() && blur >= 0.0) {
                return Err(KeyframeError::config_error(format!(
                    "Blur threshold must be a non-negative number, got: {}",
                    blur
                )));
            }
        }

        self.sampling.validate()
    }
}
