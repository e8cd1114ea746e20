//! Laplacian-variance sharpness score
//!
//! The Laplacian highlights rapid intensity changes. A sharp frame has strong
//! edges and therefore a high variance of the Laplacian response; a blurred,
//! flat or transitional frame has a low one.

use tracing::trace;
use crate::frame::{reflect_101, Frame, GrayImage};

/// Sharpness of a color frame, computed on its grayscale version
pub fn score(frame: &Frame) -> f64 {
    laplacian_variance(&frame.to_gray())
}

/// Population variance of the 3x3 Laplacian response
///
/// Kernel:
/// ```text
/// [ 0  1  0 ]
/// [ 1 -4  1 ]
/// [ 0  1  0 ]
/// ```
/// Every pixel contributes; borders are mirrored without repeating the edge
/// pixel, so frames smaller than the kernel still get a score.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return 0.0;
    }

    let at = |x: isize, y: isize| {
        img.get_pixel(reflect_101(x, w) as u32, reflect_101(y, h) as u32)[0] as i32
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h as isize {
        for x in 0..w as isize {
            let laplacian = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4 * at(x, y);
            let v = laplacian as f64;
            sum += v;
            sum_sq += v * v;
        }
    }

    let n = (w * h) as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);

    trace!("Laplacian variance: {:.2} over {}x{}", variance, w, h);
    variance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::FrameTimecode, frame::gaussian_blur};

    fn tc() -> FrameTimecode {
        FrameTimecode::new(0, 25.0)
    }

    #[test]
    fn test_flat_frame_has_zero_sharpness() {
        let frame = Frame::from_fn(tc(), 32, 32, |_, _| [90, 90, 90]);
        assert_eq!(score(&frame), 0.0);

        let black = Frame::from_fn(tc(), 1, 1, |_, _| [0, 0, 0]);
        assert_eq!(score(&black), 0.0);
    }

    #[test]
    fn test_checkerboard_is_sharp() {
        // Alternating 0/255: every response is +/-1020 with zero mean
        let frame = Frame::from_fn(tc(), 8, 8, |x, y| {
            if (x + y) % 2 == 0 { [0; 3] } else { [255; 3] }
        });
        assert_eq!(score(&frame), 1020.0 * 1020.0);
    }

    #[test]
    fn test_blur_lowers_sharpness() {
        let frame = Frame::from_fn(tc(), 40, 40, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 { [20; 3] } else { [230; 3] }
        });
        let gray = frame.to_gray();
        let sharp = laplacian_variance(&gray);
        let blurred = laplacian_variance(&gaussian_blur(&gray, 21));

        assert!(sharp > 100.0);
        assert!(blurred < sharp);
    }

    #[test]
    fn test_empty_image() {
        let empty = GrayImage::new(0, 0);
        assert_eq!(laplacian_variance(&empty), 0.0);
    }
}
