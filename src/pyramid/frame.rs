//! Synthetic input frames.
//!
//! Frames show a target of concentric rings that drifts around the image
//! center from frame to frame, so every octave sees strong edges.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;

/// Number of rings in the target.
pub const RINGS: i32 = 5;

const BACKGROUND: Luma<u8> = Luma([32]);
const LIGHT: Luma<u8> = Luma([230]);
const DARK: Luma<u8> = Luma([20]);

/// Render frame number `frame` of the drifting ring target.
pub fn ring_target(width: u32, height: u32, frame: u64) -> GrayImage {
    let mut image = GrayImage::from_pixel(width.max(1), height.max(1), BACKGROUND);

    let phase = frame as f64 * 0.3;
    let drift = (width.min(height) / 8) as f64;
    let center = (
        (width / 2) as i32 + (phase.cos() * drift) as i32,
        (height / 2) as i32 + (phase.sin() * drift) as i32,
    );
    let outer = (width.min(height) / 3) as i32;

    // Largest first, so each smaller disc paints the next ring.
    for ring in (1..=RINGS).rev() {
        let radius = outer * ring / RINGS;
        let color = if ring % 2 == 0 { DARK } else { LIGHT };
        draw_filled_circle_mut(&mut image, center, radius, color);
    }
    image
}
