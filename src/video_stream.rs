//! Video stream handling using OpenCV backend
//!
//! This module wraps OpenCV's VideoCapture and turns decoded BGR matrices
//! into RGB [`Frame`] values tagged with their source position, so the
//! selector never touches OpenCV types.

use opencv::{core::Mat, imgproc, prelude::*, videoio};
use tracing::{instrument, debug, info, trace, warn};
use std::path::Path;
use crate::{
    common::{FrameTimecode, KeyframeError, Result},
    frame::Frame,
};

/// Wrapper around OpenCV VideoCapture that yields frames in source order
pub struct VideoStream {
    cap: videoio::VideoCapture,
    fps: f64,
    frame_count: Option<u64>,
    next_frame: u64,
    width: u32,
    height: u32,
    path: String,
}

impl VideoStream {
    /// Open a video file for reading
    ///
    /// # Errors
    /// * `VideoNotFound` - If the file doesn't exist
    /// * `VideoOpenFailed` - If OpenCV can't open the file
    /// * `InvalidVideoFormat` - If the reported properties are unusable
    ///
    /// A missing or non-positive frame count is not an error; many streamed
    /// containers only learn their length by decoding to the end.
    #[instrument]
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening video stream: {}", path);

        if !Path::new(path).is_file() {
            return Err(KeyframeError::VideoNotFound { path: path.to_string() });
        }

        let open_failed = |e: opencv::Error| {
            warn!("Failed to open VideoCapture: {}", e);
            KeyframeError::VideoOpenFailed { path: path.to_string() }
        };
        let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY).map_err(open_failed)?;
        if !cap.is_opened().map_err(open_failed)? {
            return Err(KeyframeError::VideoOpenFailed { path: path.to_string() });
        }

        let property = |id: i32, name: &str| {
            cap.get(id).map_err(|e| {
                warn!("Failed to get video {}: {}", name, e);
                KeyframeError::InvalidVideoFormat { path: path.to_string() }
            })
        };
        let fps = property(videoio::CAP_PROP_FPS, "FPS")?;
        let frame_count = known_frame_count(property(videoio::CAP_PROP_FRAME_COUNT, "frame count")?);
        let width = property(videoio::CAP_PROP_FRAME_WIDTH, "width")?;
        let height = property(videoio::CAP_PROP_FRAME_HEIGHT, "height")?;

        if !(fps.is_finite() && fps > 0.0) || width <= 0.0 || height <= 0.0 {
            return Err(KeyframeError::InvalidVideoFormat { path: path.to_string() });
        }
        info!("Video opened successfully - FPS: {:.2}, Frames: {}, Size: {}x{}",
              fps, display_count(frame_count), width, height);

        Ok(Self {
            cap,
            fps,
            frame_count,
            next_frame: 0,
            width: width as u32,
            height: height as u32,
            path: path.to_string(),
        })
    }

    /// Read and convert the next frame
    ///
    /// # Returns
    /// * `Ok(None)` at the end of the video
    #[instrument(skip(self))]
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut bgr = Mat::default();
        let success = self.cap.read(&mut bgr)?;

        if !success || bgr.empty() {
            debug!("Reached end of video at frame {}", self.next_frame);
            return Ok(None);
        }

        if bgr.channels() != 3 {
            return Err(KeyframeError::invalid_frame(format!(
                "Frame {} has {} channels, expected 3", self.next_frame, bgr.channels()
            )));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB)?;

        let timecode = FrameTimecode::try_new(self.next_frame, self.fps)?;
        let frame = Frame::new(timecode, rgb.cols() as u32, rgb.rows() as u32, rgb.data_bytes()?.to_vec())?;

        self.next_frame += 1;
        trace!("Read frame {}/{}", self.next_frame, display_count(self.frame_count));

        Ok(Some(frame))
    }

    /// Iterate over the remaining frames
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { stream: self, done: false }
    }

    /// Number of frames read so far
    pub fn frames_read(&self) -> u64 {
        self.next_frame
    }

    /// Metadata snapshot of this stream
    pub fn info(&self) -> VideoInfo {
        VideoInfo {
            path: self.path.clone(),
            fps: self.fps,
            frame_count: self.frame_count,
            width: self.width,
            height: self.height,
            duration_seconds: self.frame_count.map(|count| count as f64 / self.fps),
        }
    }
}

// Implement Debug manually to avoid showing internal OpenCV state
impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("path", &self.path)
            .field("fps", &self.fps)
            .field("frame_count", &self.frame_count)
            .field("next_frame", &self.next_frame)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Frame iterator over a [`VideoStream`]; ends after the first read error
pub struct Frames<'a> {
    stream: &'a mut VideoStream,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Container frame count, or `None` when the backend reports 0 or -1
fn known_frame_count(reported: f64) -> Option<u64> {
    (reported.is_finite() && reported >= 1.0).then(|| reported as u64)
}

fn display_count(count: Option<u64>) -> String {
    count.map_or_else(|| "unknown".to_string(), |n| n.to_string())
}

/// Video metadata information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    pub fps: f64,
    pub frame_count: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: Option<f64>,
}

impl VideoInfo {
    /// Get a human-readable description of the video
    pub fn description(&self) -> String {
        let length = match (self.frame_count, self.duration_seconds) {
            (Some(count), Some(seconds)) => format!("{} frames ({:.1}s duration)", count, seconds),
            _ => "unknown length".to_string(),
        };
        format!("{}x{} at {:.2}fps, {}", self.width, self.height, self.fps, length)
    }

    /// Check if this appears to be a valid video configuration
    ///
    /// An unknown length is fine; a known length of zero is not.
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0
            && self.width > 0
            && self.height > 0
            && self.frame_count.map_or(true, |count| count > 0)
            && self.duration_seconds.map_or(true, |seconds| seconds > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_video_stream_nonexistent_file() {
        match VideoStream::open("nonexistent_video.mp4").unwrap_err() {
            KeyframeError::VideoNotFound { path } => {
                assert_eq!(path, "nonexistent_video.mp4");
            }
            other => panic!("Expected VideoNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_video_stream_directory_instead_of_file() {
        let temp_dir = std::env::temp_dir().join("keyframe_select_video_dir");
        fs::create_dir_all(&temp_dir).expect("Failed to create test directory");

        let result = VideoStream::open(temp_dir.to_str().unwrap());
        fs::remove_dir_all(&temp_dir).ok();

        assert!(matches!(result.unwrap_err(), KeyframeError::VideoNotFound { .. }));
    }

    #[test]
    fn test_garbage_file_fails_to_open() {
        let path = std::env::temp_dir().join("keyframe_select_garbage.mp4");
        fs::write(&path, b"not a video").expect("Failed to write test file");

        let result = VideoStream::open(path.to_str().unwrap());
        fs::remove_file(&path).ok();

        assert!(matches!(
            result.unwrap_err(),
            KeyframeError::VideoOpenFailed { .. } | KeyframeError::InvalidVideoFormat { .. }
        ));
    }

    #[test]
    fn test_unknown_frame_count() {
        assert_eq!(known_frame_count(-1.0), None);
        assert_eq!(known_frame_count(0.0), None);
        assert_eq!(known_frame_count(f64::NAN), None);
        assert_eq!(known_frame_count(1.0), Some(1));
        assert_eq!(known_frame_count(1250.0), Some(1250));
        assert_eq!(display_count(None), "unknown");
    }

    #[test]
    fn test_video_info_creation() {
        let info = VideoInfo {
            path: "test.mp4".to_string(),
            fps: 25.0,
            frame_count: Some(1000),
            width: 1920,
            height: 1080,
            duration_seconds: Some(40.0),
        };

        assert!(info.is_valid());
        assert!(info.description().contains("1920x1080"));
        assert!(info.description().contains("25.00fps"));
        assert!(info.description().contains("1000 frames"));
    }

    #[test]
    fn test_streamed_video_info_is_valid() {
        let info = VideoInfo {
            path: "live.webm".to_string(),
            fps: 30.0,
            frame_count: None,
            width: 640,
            height: 360,
            duration_seconds: None,
        };

        assert!(info.is_valid());
        assert_eq!(info.description(), "640x360 at 30.00fps, unknown length");
    }

    #[test]
    fn test_video_info_validation() {
        let valid_info = VideoInfo {
            path: "test.mp4".to_string(),
            fps: 30.0,
            frame_count: Some(100),
            width: 640,
            height: 480,
            duration_seconds: Some(3.33),
        };
        assert!(valid_info.is_valid());

        assert!(!VideoInfo { fps: 0.0, ..valid_info.clone() }.is_valid());
        assert!(!VideoInfo { frame_count: Some(0), ..valid_info.clone() }.is_valid());
        assert!(!VideoInfo { width: 0, ..valid_info.clone() }.is_valid());
        assert!(!VideoInfo { height: 0, ..valid_info.clone() }.is_valid());
        assert!(!VideoInfo { duration_seconds: Some(0.0), ..valid_info }.is_valid());
    }
}
