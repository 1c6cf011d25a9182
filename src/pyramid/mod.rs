//! Octave pyramid pipeline.
//!
//! A [`LayerPipeline`] that keeps one image per octave. The host loads a
//! frame between rounds (building every octave by repeated halving); during
//! a round each layer's worker computes Sobel gradients for its octave,
//! marks its ready point, and then summarizes the edges it found.
//!
//! Each octave sits behind its own lock, and a worker only ever locks its
//! own octave.

pub mod config;
pub mod frame;

pub use config::DemoConfig;
pub use frame::ring_target;

use crate::core::error::LayerId;
use crate::core::pipeline::{FrameReady, LayerPipeline};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::gradients::sobel_gradients;
use parking_lot::Mutex;
use serde::Serialize;

type GradientImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Edge statistics for one octave of one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OctaveSummary {
    /// Octave (layer) index.
    pub layer: LayerId,
    /// Frame the octave was built from.
    pub frame: u64,
    /// Octave width in pixels.
    pub width: u32,
    /// Octave height in pixels.
    pub height: u32,
    /// Pixels whose gradient magnitude exceeds the edge threshold.
    pub edge_pixels: u64,
    /// Mean gradient magnitude.
    pub mean_magnitude: f64,
}

struct Octave {
    image: GrayImage,
    frame: u64,
    gradients: Option<GradientImage>,
    summary: Option<OctaveSummary>,
}

impl Octave {
    fn empty() -> Self {
        Self {
            image: GrayImage::new(0, 0),
            frame: 0,
            gradients: None,
            summary: None,
        }
    }
}

/// Multi-octave edge pipeline, one layer per octave.
pub struct OctavePyramid {
    octaves: Vec<Mutex<Octave>>,
    edge_threshold: u16,
}

impl OctavePyramid {
    /// Create an empty pyramid with `layers` octaves.
    pub fn new(layers: usize, edge_threshold: u16) -> Self {
        Self {
            octaves: (0..layers).map(|_| Mutex::new(Octave::empty())).collect(),
            edge_threshold,
        }
    }

    /// Number of octaves.
    pub fn layers(&self) -> usize {
        self.octaves.len()
    }

    /// Rebuild every octave from `image`.
    ///
    /// Call between rounds only; it touches every layer.
    pub fn load_frame(&self, image: &GrayImage, frame: u64) {
        let mut current = image.clone();
        for (layer, octave) in self.octaves.iter().enumerate() {
            if layer > 0 {
                current = downsample(&current);
            }
            let mut octave = octave.lock();
            octave.image = current.clone();
            octave.frame = frame;
            octave.gradients = None;
            octave.summary = None;
        }
        log::trace!("Loaded frame {} into {} octaves", frame, self.layers());
    }

    /// Number of octaves whose gradients are computed for the current frame.
    pub fn ready_layers(&self) -> usize {
        self.octaves
            .iter()
            .filter(|octave| octave.lock().gradients.is_some())
            .count()
    }

    /// Summary of one octave, once it has been processed.
    pub fn summary(&self, layer: LayerId) -> Option<OctaveSummary> {
        self.octaves
            .get(layer.index())
            .and_then(|octave| octave.lock().summary.clone())
    }

    /// Summaries of every processed octave, in layer order.
    pub fn summaries(&self) -> Vec<OctaveSummary> {
        self.octaves
            .iter()
            .filter_map(|octave| octave.lock().summary.clone())
            .collect()
    }

    fn compute_gradients(&self, layer: LayerId) {
        let mut octave = self.octaves[layer.index()].lock();
        let gradients = sobel_gradients(&octave.image);
        octave.gradients = Some(gradients);
    }

    fn summarize(&self, layer: LayerId) {
        let mut octave = self.octaves[layer.index()].lock();
        let Some(gradients) = octave.gradients.as_ref() else {
            return;
        };

        let mut edge_pixels = 0u64;
        let mut total = 0u64;
        for Luma([magnitude]) in gradients.pixels() {
            total += u64::from(*magnitude);
            if *magnitude > self.edge_threshold {
                edge_pixels += 1;
            }
        }
        let pixel_count = u64::from(gradients.width()) * u64::from(gradients.height());
        let mean_magnitude = if pixel_count == 0 {
            0.0
        } else {
            total as f64 / pixel_count as f64
        };

        let (width, height) = octave.image.dimensions();
        let frame = octave.frame;
        octave.summary = Some(OctaveSummary {
            layer,
            frame,
            width,
            height,
            edge_pixels,
            mean_magnitude,
        });
    }
}

impl LayerPipeline for OctavePyramid {
    fn process(&self, layer: LayerId) {
        self.compute_gradients(layer);
        self.summarize(layer);
    }

    fn process_staged(&self, layer: LayerId, ready: &FrameReady<'_>) {
        self.compute_gradients(layer);
        ready.post();
        self.summarize(layer);
    }
}

/// Halve an image in both dimensions, never below 1x1.
pub fn downsample(image: &GrayImage) -> GrayImage {
    let width = (image.width() / 2).max(1);
    let height = (image.height() / 2).max(1);
    imageops::resize(image, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octaves_halve() {
        let pyramid = OctavePyramid::new(4, 100);
        pyramid.load_frame(&ring_target(160, 120, 0), 7);

        for index in 0..4 {
            pyramid.process(LayerId(index));
        }

        let sizes: Vec<_> = pyramid
            .summaries()
            .iter()
            .map(|summary| (summary.width, summary.height, summary.frame))
            .collect();
        assert_eq!(sizes, vec![(160, 120, 7), (80, 60, 7), (40, 30, 7), (20, 15, 7)]);
    }

    #[test]
    fn test_downsample_clamps_to_one_pixel() {
        let image = GrayImage::new(1, 3);
        assert_eq!(downsample(&image).dimensions(), (1, 1));
    }

    #[test]
    fn test_rings_produce_edges() {
        let pyramid = OctavePyramid::new(1, 100);
        pyramid.load_frame(&ring_target(128, 128, 0), 0);
        pyramid.process(LayerId(0));

        let summary = pyramid.summary(LayerId(0)).unwrap();
        assert!(summary.edge_pixels > 0);
        assert!(summary.mean_magnitude > 0.0);
    }

    #[test]
    fn test_flat_frame_has_no_edges() {
        let pyramid = OctavePyramid::new(1, 10);
        pyramid.load_frame(&GrayImage::from_pixel(32, 32, Luma([90])), 0);
        pyramid.process(LayerId(0));

        let summary = pyramid.summary(LayerId(0)).unwrap();
        assert_eq!(summary.edge_pixels, 0);
        assert_eq!(summary.mean_magnitude, 0.0);
    }

    #[test]
    fn test_loading_a_frame_clears_results() {
        let pyramid = OctavePyramid::new(2, 100);
        pyramid.load_frame(&ring_target(64, 64, 0), 0);
        pyramid.process(LayerId(0));
        assert_eq!(pyramid.ready_layers(), 1);
        assert_eq!(pyramid.summaries().len(), 1);

        pyramid.load_frame(&ring_target(64, 64, 1), 1);
        assert_eq!(pyramid.ready_layers(), 0);
        assert!(pyramid.summary(LayerId(0)).is_none());
        assert!(pyramid.summary(LayerId(9)).is_none());
    }
}
