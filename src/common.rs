//! Frame timecodes and the error taxonomy shared by the selection loop and
//! the video I/O layer.

use tracing::trace;

/// Source position of a decoded frame
///
/// The selector orders and samples frames by `frame_number`; `fps` turns that
/// index into a timestamp for interval sampling and for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimecode {
    frame_number: u64,
    fps: f64,
}

impl FrameTimecode {
    /// Tag frame `frame_number` (0-based) of a stream decoded at `fps`
    ///
    /// # Panics
    /// If `fps` is not a positive number (NaN included). Use
    /// [`try_new`](Self::try_new) for rates read from untrusted input.
    pub fn new(frame_number: u64, fps: f64) -> Self {
        assert!(fps > 0.0, "FPS must be positive, got: {}", fps);
        trace!(frame_number, fps, "New timecode");

        Self { frame_number, fps }
    }

    /// Fallible [`new`](Self::new)
    ///
    /// # Errors
    /// * `InvalidFrame` - If `fps` is not a positive finite number
    pub fn try_new(frame_number: u64, fps: f64) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(KeyframeError::invalid_frame(format!(
                "Frame {} has an unusable frame rate: {}",
                frame_number, fps
            )));
        }
        Ok(Self::new(frame_number, fps))
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Offset from the start of the stream
    pub fn seconds(&self) -> f64 {
        self.frame_number as f64 / self.fps
    }

    pub fn milliseconds(&self) -> f64 {
        self.seconds() * 1000.0
    }
}

impl std::fmt::Display for FrameTimecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame {} ({:.2}s)", self.frame_number, self.seconds())
    }
}

/// Errors from keyframe selection
///
/// Covers the selection loop's own failure modes (shape mismatches, degenerate
/// or malformed frames, ordering violations) as well as video I/O when the
/// `video` feature is enabled.
#[derive(Debug, thiserror::Error)]
pub enum KeyframeError {
    #[error("Fingerprint shape mismatch: reference is {expected}, candidate is {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Degenerate frame {frame}: zero area ({width}x{height})")]
    DegenerateFrame { frame: u64, width: u32, height: u32 },

    #[error("Frame {frame} repeats the previous frame number")]
    DuplicateFrame { frame: u64 },

    #[error("Invalid frame data: {reason}")]
    InvalidFrame { reason: String },

    #[error("Frame {frame} arrived after frame {previous}; frames must be in source order")]
    OutOfOrder { frame: u64, previous: u64 },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Selection aborted (last processed frame: {}): {source}", display_last(.last_processed))]
    RunAborted {
        last_processed: Option<u64>,
        #[source]
        source: Box<KeyframeError>,
    },

    #[cfg(feature = "video")]
    #[error("Video file not found: {path}")]
    VideoNotFound { path: String },

    #[cfg(feature = "video")]
    #[error("Failed to open video file: {path}")]
    VideoOpenFailed { path: String },

    #[cfg(feature = "video")]
    #[error("Invalid video format or corrupted file: {path}")]
    InvalidVideoFormat { path: String },

    #[cfg(feature = "video")]
    #[error("No frames found in video")]
    EmptyVideo,

    #[cfg(feature = "video")]
    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode keyframe {frame}: {reason}")]
    EncodeFailed { frame: u64, reason: String },
}

fn display_last(last: &Option<u64>) -> String {
    match last {
        Some(frame) => frame.to_string(),
        None => "none".to_string(),
    }
}

impl KeyframeError {
    /// Create a configuration error with a descriptive message
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Create a malformed-frame error
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame { reason: reason.into() }
    }

    /// Create a shape mismatch error from two shape descriptions
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Wrap a fatal error with the last frame the run got through
    pub fn aborted(last_processed: Option<u64>, source: KeyframeError) -> Self {
        Self::RunAborted {
            last_processed,
            source: Box::new(source),
        }
    }

    /// Whether the run may skip the offending frame and continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DegenerateFrame { .. } | Self::DuplicateFrame { .. })
    }
}

/// Convenient Result type for keyframe selection operations
pub type Result<T> = std::result::Result<T, KeyframeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timecode_positions() {
        let tc = FrameTimecode::new(100, 25.0);
        assert_eq!(tc.frame_number(), 100);
        assert_eq!(tc.seconds(), 4.0);
        assert_eq!(tc.milliseconds(), 4000.0);

        assert_eq!(FrameTimecode::new(0, 30.0).seconds(), 0.0);

        // NTSC rate
        let tc = FrameTimecode::new(100, 29.97);
        assert!((tc.seconds() - 3.336_670_003_336_67).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "FPS must be positive")]
    fn test_timecode_rejects_zero_fps() {
        FrameTimecode::new(12, 0.0);
    }

    #[test]
    fn test_timecode_try_new() {
        assert_eq!(FrameTimecode::try_new(10, 25.0).unwrap(), FrameTimecode::new(10, 25.0));

        for fps in [0.0, -25.0, f64::NAN, f64::INFINITY] {
            let err = FrameTimecode::try_new(10, fps).unwrap_err();
            assert!(matches!(err, KeyframeError::InvalidFrame { .. }), "fps {}", fps);
        }
    }

    #[test]
    #[should_panic(expected = "FPS must be positive")]
    fn test_timecode_rejects_nan_fps() {
        FrameTimecode::new(0, f64::NAN);
    }

    #[test]
    fn test_timecode_display() {
        assert_eq!(FrameTimecode::new(50, 25.0).to_string(), "frame 50 (2.00s)");
        assert_eq!(FrameTimecode::new(7, 2.0).to_string(), "frame 7 (3.50s)");
    }

    #[test]
    fn test_error_types() {
        let error = KeyframeError::config_error("Invalid threshold");
        assert!(matches!(error, KeyframeError::InvalidConfig { .. }));
        assert!(!error.is_recoverable());

        let error = KeyframeError::DegenerateFrame { frame: 3, width: 0, height: 10 };
        assert!(error.is_recoverable());

        let error = KeyframeError::DuplicateFrame { frame: 3 };
        assert!(error.is_recoverable());

        let error = KeyframeError::shape_mismatch("4x4 grid", "8x8 grid");
        assert!(matches!(error, KeyframeError::ShapeMismatch { .. }));
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = KeyframeError::config_error("Threshold must be finite");
        assert_eq!(error.to_string(), "Invalid configuration: Threshold must be finite");

        let error = KeyframeError::aborted(
            Some(41),
            KeyframeError::shape_mismatch("256 bins", "64 bins"),
        );
        assert_eq!(
            error.to_string(),
            "Selection aborted (last processed frame: 41): \
             Fingerprint shape mismatch: reference is 256 bins, candidate is 64 bins"
        );

        let error = KeyframeError::aborted(None, KeyframeError::OutOfOrder { frame: 1, previous: 2 });
        assert!(error.to_string().starts_with("Selection aborted (last processed frame: none)"));
    }
}
