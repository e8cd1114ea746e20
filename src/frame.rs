//! Decoded frames and grayscale images
//!
//! `Frame` is the unit the selector consumes: an immutable RGB image
//! (8 bits per channel) tagged with its source position. Grayscale work
//! happens on `image::GrayImage`, which every fingerprint and the sharpness
//! score are computed from.

use image::{Luma, Rgb};
use tracing::trace;
use crate::common::{FrameTimecode, KeyframeError, Result};

pub use image::{GrayImage, RgbImage};

/// Number of color channels in a `Frame`
pub const CHANNELS: usize = 3;

/// An immutable decoded video frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    timecode: FrameTimecode,
    image: RgbImage,
}

impl Frame {
    /// Create a frame from a packed, row-major RGB buffer
    ///
    /// # Errors
    /// * `InvalidFrame` - If the buffer length is not `width * height * 3`
    pub fn new(timecode: FrameTimecode, width: u32, height: u32, rgb: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        let actual = rgb.len();
        let invalid = || {
            KeyframeError::invalid_frame(format!(
                "{}x{} RGB frame needs {} bytes, got {}",
                width, height, expected, actual
            ))
        };

        if actual != expected {
            return Err(invalid());
        }
        let image = RgbImage::from_raw(width, height, rgb).ok_or_else(invalid)?;

        Ok(Self { timecode, image })
    }

    /// Wrap an already decoded image
    pub fn from_image(timecode: FrameTimecode, image: RgbImage) -> Self {
        Self { timecode, image }
    }

    /// Build a frame by evaluating `pixel(x, y)` for every position
    ///
    /// The timecode is built by the caller; `FrameTimecode::new` panics on a
    /// non-positive fps, so use `FrameTimecode::try_new` for untrusted rates.
    pub fn from_fn<F>(timecode: FrameTimecode, width: u32, height: u32, mut pixel: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 3],
    {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb(pixel(x, y)));
        Self { timecode, image }
    }

    pub fn timecode(&self) -> FrameTimecode {
        self.timecode
    }

    pub fn frame_number(&self) -> u64 {
        self.timecode.frame_number()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// A frame with no pixels cannot be fingerprinted
    pub fn is_degenerate(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Convert to grayscale with BT.601 luma weights
    ///
    /// Uses the 14-bit fixed-point weights common vision libraries use for
    /// RGB to gray. `DynamicImage::to_luma8` weighs channels by Rec. 709 and
    /// gives different intensities.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let Rgb([r, g, b]) = *self.image.get_pixel(x, y);
            Luma([bt601_luma(r, g, b)])
        })
    }
}

fn bt601_luma(r: u8, g: u8, b: u8) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const SHIFT: u32 = 14;

    let y = r as u32 * R + g as u32 * G + b as u32 * B + (1 << (SHIFT - 1));
    (y >> SHIFT) as u8
}

/// Separable Gaussian smoothing with an odd `kernel_size`
///
/// Sigma is derived from the kernel size the same way vision libraries do
/// when it is left unspecified (`0.3 * ((k - 1) / 2 - 1) + 0.8`). Borders
/// are mirrored without repeating the edge pixel.
pub fn gaussian_blur(gray: &GrayImage, kernel_size: usize) -> GrayImage {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    if w == 0 || h == 0 {
        return gray.clone();
    }

    let kernel = gaussian_kernel(kernel_size);
    let radius = (kernel.len() / 2) as isize;

    let mut horizontal = vec![0.0f64; w * h];
    for y in 0..h {
        for x in 0..w {
            horizontal[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sx = reflect_101(x as isize + k as isize - radius, w);
                    gray.get_pixel(sx as u32, y as u32)[0] as f64 * weight
                })
                .sum();
        }
    }

    let blurred = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value: f64 = kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| {
                let sy = reflect_101(y as isize + k as isize - radius, h);
                horizontal[sy * w + x as usize] * weight
            })
            .sum();
        Luma([value.round().clamp(0.0, 255.0) as u8])
    });

    trace!("Gaussian blur {}x{} with {}-tap kernel", w, h, kernel.len());
    blurred
}

/// Normalized 1-D Gaussian weights for an odd kernel size
fn gaussian_kernel(kernel_size: usize) -> Vec<f64> {
    let size = kernel_size.max(1) | 1;
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f64;

    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();

    raw.into_iter().map(|v| v / total).collect()
}

/// Map an out-of-range coordinate back into `0..len` by mirroring around the
/// edge pixels without repeating them (`dcb|abcd|cba`)
pub(crate) fn reflect_101(mut i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * (len - 1) - i;
        } else {
            return i as usize;
        }
    }
}
