//! Writing accepted keyframes to disk
//!
//! Each accepted frame is encoded as `keyframe_<n>.jpg` in the output
//! directory, numbered in acceptance order. A `manifest.json` next to the
//! images records where every keyframe came from and why it was kept.

use opencv::{
    core::{Mat, Scalar, Vector, CV_8UC3},
    imgcodecs, imgproc,
    prelude::*,
};
use serde_json::{json, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use crate::{
    common::{KeyframeError, Result},
    params::SelectionParameters,
    selector::{AcceptedFrame, SelectionStats},
    frame::Frame,
};

/// File name of the run manifest
pub const MANIFEST_FILE: &str = "manifest.json";

const JPEG_QUALITY: i32 = 95;

/// One keyframe written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct SavedKeyframe {
    pub path: PathBuf,
    pub frame_number: u64,
    pub seconds: f64,
    pub reason: String,
    pub score: Option<f64>,
    pub sharpness: Option<f64>,
}

impl SavedKeyframe {
    fn to_json(&self) -> Value {
        json!({
            "file": self.path.file_name().map(|n| n.to_string_lossy().into_owned()),
            "frame_number": self.frame_number,
            "seconds": self.seconds,
            "reason": self.reason,
            "score": self.score,
            "sharpness": self.sharpness,
        })
    }
}

/// Encodes accepted frames as JPEG files
#[derive(Debug)]
pub struct KeyframeWriter {
    output_dir: PathBuf,
    saved: Vec<SavedKeyframe>,
}

impl KeyframeWriter {
    /// Prepare `output_dir`, creating it if needed
    ///
    /// With `clean` set, images and the manifest left by a previous run are
    /// removed first. Other files are left alone.
    #[instrument(skip(output_dir), fields(dir = %output_dir.as_ref().display()))]
    pub fn create(output_dir: impl AsRef<Path>, clean: bool) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;

        if clean {
            let mut removed = 0;
            for entry in fs::read_dir(&output_dir)? {
                let path = entry?.path();
                if path.is_file() && is_previous_output(&path) {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
            debug!("Removed {} files from previous run", removed);
        }

        Ok(Self {
            output_dir,
            saved: Vec::new(),
        })
    }

    /// Encode one accepted frame
    #[instrument(skip(self, keyframe), fields(frame = keyframe.frame.frame_number()))]
    pub fn write(&mut self, keyframe: &AcceptedFrame) -> Result<&SavedKeyframe> {
        let path = self.output_dir.join(format!("keyframe_{}.jpg", self.saved.len()));
        let bgr = to_bgr_mat(&keyframe.frame)?;

        let params = Vector::<i32>::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, JPEG_QUALITY]);
        let path_str = path.to_string_lossy();
        if !imgcodecs::imwrite(&path_str, &bgr, &params)? {
            return Err(KeyframeError::EncodeFailed {
                frame: keyframe.frame.frame_number(),
                reason: format!("encoder refused to write {}", path_str),
            });
        }

        debug!("Saved {}", path.display());
        let timecode = keyframe.timecode();
        self.saved.push(SavedKeyframe {
            path,
            frame_number: timecode.frame_number(),
            seconds: timecode.seconds(),
            reason: keyframe.reason.to_string(),
            score: keyframe.score,
            sharpness: keyframe.sharpness,
        });

        Ok(&self.saved[self.saved.len() - 1])
    }

    /// Keyframes written so far
    pub fn saved(&self) -> &[SavedKeyframe] {
        &self.saved
    }

    /// Write `manifest.json` describing the run and return its path
    pub fn write_manifest(
        &self,
        video_path: &str,
        params: &SelectionParameters,
        stats: &SelectionStats,
    ) -> Result<PathBuf> {
        let manifest = manifest_json(video_path, params, stats, &self.saved);
        let path = self.output_dir.join(MANIFEST_FILE);
        fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;

        info!("Wrote manifest with {} keyframes to {}", self.saved.len(), path.display());
        Ok(path)
    }
}

/// JSON description of a run
pub fn manifest_json(
    video_path: &str,
    params: &SelectionParameters,
    stats: &SelectionStats,
    saved: &[SavedKeyframe],
) -> Value {
    json!({
        "video_path": video_path,
        "config": params_json(params),
        "stats": {
            "frames_seen": stats.frames_seen,
            "sampled": stats.sampled,
            "accepted": stats.accepted,
            "too_similar": stats.too_similar,
            "too_blurry": stats.too_blurry,
            "skipped": stats.skipped,
        },
        "keyframes": saved.iter().map(SavedKeyframe::to_json).collect::<Vec<_>>(),
    })
}

/// JSON description of a parameter set
pub fn params_json(params: &SelectionParameters) -> Value {
    json!({
        "strategy": params.strategy.name(),
        "similarity_threshold": params.similarity_threshold,
        "blur_threshold": params.blur_threshold,
        "sampling": format!("{:?}", params.sampling),
        "force_first_frame": params.force_first_frame,
    })
}

fn is_previous_output(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name == MANIFEST_FILE || (name.starts_with("keyframe_") && name.ends_with(".jpg"))
}

fn to_bgr_mat(frame: &Frame) -> Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(frame.image().as_raw());

    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;
    Ok(bgr)
}
