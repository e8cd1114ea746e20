//! Keyframe selection for video
//!
//! This crate picks representative frames out of a video: it samples frames,
//! detects shot changes against the last accepted frame (grayscale histogram
//! correlation or smoothed frame differencing), drops blurry candidates with
//! a Laplacian-variance filter, and hands back the survivors in source order.
//!
//! The selection core works on RGB [`Frame`] values backed by `image`
//! buffers and has no video dependencies. Decoding and JPEG output go through
//! OpenCV and are available with the `video` feature.
//!
//! # Quick Start
//!
//! ```rust
//! use keyframe_select::{Frame, FrameTimecode, KeyframeSelector, Preset, SelectionParameters, Sampling};
//!
//! let params = SelectionParameters::from_preset(Preset::EveryThird)
//!     .with_sampling(Sampling::EveryFrame);
//! let mut selector = KeyframeSelector::new(params)?;
//!
//! let frames = (0..4).map(|n| {
//!     Frame::from_fn(FrameTimecode::new(n, 25.0), 16, 16, |x, y| {
//!         if (x + y) % 2 == 0 { [0; 3] } else { [255; 3] }
//!     })
//! });
//! let keyframes = selector.select_all(frames)?;
//! assert_eq!(keyframes.len(), 1);
//! # Ok::<(), keyframe_select::KeyframeError>(())
//! ```

mod common;
mod fingerprint;
mod frame;
mod params;
mod selector;
pub mod sharpness;
#[cfg(feature = "video")]
mod output;
#[cfg(feature = "video")]
mod video_stream;

// Re-export main types for public API
pub use common::{FrameTimecode, KeyframeError, Result};
pub use fingerprint::{Fingerprint, FingerprintStrategy, DEFAULT_BLUR_KERNEL, HISTOGRAM_BINS};
pub use frame::{gaussian_blur, Frame, GrayImage, RgbImage};
pub use params::{Preset, Sampling, SelectionParameters};
pub use selector::{
    AcceptedFrame, Decision, DecisionReason, KeyframeSelector, Keyframes, ReferenceState,
    SelectionStats,
};
#[cfg(feature = "video")]
pub use output::{manifest_json, params_json, KeyframeWriter, SavedKeyframe, MANIFEST_FILE};
#[cfg(feature = "video")]
pub use video_stream::{VideoInfo, VideoStream};

use tracing::info;
#[cfg(feature = "video")]
use tracing::{debug, instrument};

/// Result of [`extract_keyframes`]
#[cfg(feature = "video")]
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub video: VideoInfo,
    pub keyframes: Vec<SavedKeyframe>,
    pub stats: SelectionStats,
    pub manifest: std::path::PathBuf,
}

/// Decode a video and return its keyframes in memory
///
/// # Errors
/// * `VideoNotFound` / `VideoOpenFailed` / `InvalidVideoFormat` - If the video can't be opened
/// * `EmptyVideo` - If not a single frame decodes
/// * `RunAborted` - If decoding or selection fails part way through
#[cfg(feature = "video")]
#[instrument(skip(params))]
pub fn select_keyframes(video_path: &str, params: SelectionParameters) -> Result<Vec<AcceptedFrame>> {
    let mut stream = VideoStream::open(video_path)?;
    let mut selector = KeyframeSelector::new(params)?;

    let keyframes = selector.run(stream.frames()).collect::<Result<Vec<_>>>()?;
    ensure_decoded(&stream)?;

    info!("Selected {} keyframes from {} frames", keyframes.len(), selector.stats().frames_seen);
    Ok(keyframes)
}

/// Decode a video, write its keyframes as JPEG files plus a manifest
///
/// Keyframes are encoded as soon as they are accepted, so only the current
/// frame and the reference fingerprint are held in memory.
#[cfg(feature = "video")]
#[instrument(skip(params))]
pub fn extract_keyframes(
    video_path: &str,
    output_dir: &str,
    params: SelectionParameters,
    clean: bool,
) -> Result<ExtractionReport> {
    info!("Starting keyframe extraction for: {}", video_path);

    let mut stream = VideoStream::open(video_path)?;
    let video = stream.info();
    info!("Video properties: {}", video.description());

    let mut selector = KeyframeSelector::new(params)?;
    let mut writer = KeyframeWriter::create(output_dir, clean)?;

    for keyframe in selector.run(stream.frames()) {
        let keyframe = keyframe?;
        let saved = writer.write(&keyframe)?;
        debug!("Keyframe {} at {:.2}s ({})", saved.path.display(), saved.seconds, saved.reason);
    }

    ensure_decoded(&stream)?;
    let stats = selector.stats();
    debug!("Decoded {} frames (container reported {:?})", stream.frames_read(), video.frame_count);

    let manifest = writer.write_manifest(video_path, selector.params(), &stats)?;

    info!("Keyframe extraction completed. Kept {} of {} sampled frames ({} decoded)",
          stats.accepted, stats.sampled, stats.frames_seen);

    Ok(ExtractionReport {
        video,
        keyframes: writer.saved().to_vec(),
        stats,
        manifest,
    })
}

/// A stream that ended before its first frame has nothing to select from
#[cfg(feature = "video")]
fn ensure_decoded(stream: &VideoStream) -> Result<()> {
    if stream.frames_read() == 0 {
        return Err(KeyframeError::EmptyVideo);
    }
    Ok(())
}

/// Get video information without running selection
#[cfg(feature = "video")]
#[instrument]
pub fn get_video_info(video_path: &str) -> Result<VideoInfo> {
    Ok(VideoStream::open(video_path)?.info())
}

/// Initialize tracing for the library
///
/// Call this once at the start of your application to enable log output.
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Arguments
/// * `level` - Tracing level filter (e.g., "debug", "info", "warn", "error")
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Keyframe selector initialized with tracing level: {}", level);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(frame: u64) -> Frame {
        Frame::from_fn(FrameTimecode::new(frame, 30.0), 24, 24, |x, _| {
            if (x / 2) % 2 == 0 { [10; 3] } else { [240; 3] }
        })
    }

    #[test]
    fn test_static_shot_yields_one_keyframe() {
        let params = SelectionParameters::from_preset(Preset::EveryThird);
        let mut selector = KeyframeSelector::new(params).unwrap();

        let accepted = selector.select_all((0..9).map(bars)).unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].reason, DecisionReason::FirstFrame);

        let stats = selector.stats();
        assert_eq!(stats.frames_seen, 9);
        assert_eq!(stats.sampled, 3);
        assert_eq!(stats.too_similar, 2);
    }

    #[test]
    fn test_sharpness_module_is_public() {
        let frame = bars(0);
        assert!(sharpness::score(&frame) > 70.0);
    }
}
