//! Pixel statistics feeding the rule-based classifier

use image::DynamicImage;

use crate::types::ImageFeatures;

/// Adjacent-sample brightness jump (0-255) counted as an edge
pub const EDGE_DELTA: f64 = 30.0;
/// Edge fraction multiplier before clamping
pub const COMPLEXITY_SCALE: f64 = 10.0;
pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

const CHANNELS: usize = 4;

/// Reduces packed RGBA pixels to brightness, contrast and complexity
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    max_samples: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl FeatureExtractor {
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples: max_samples.max(1),
        }
    }

    /// Features of a packed RGBA buffer.
    ///
    /// At most `max_samples` pixels are read, at a uniform stride over the
    /// whole buffer, so cost does not grow with image size.
    pub fn extract(&self, rgba: &[u8]) -> ImageFeatures {
        let pixel_count = rgba.len() / CHANNELS;
        if pixel_count == 0 {
            return ImageFeatures::default();
        }

        let sample_count = pixel_count.min(self.max_samples);
        let stride = pixel_count / sample_count;

        let samples: Vec<f64> = (0..sample_count)
            .map(|i| {
                let offset = i * stride * CHANNELS;
                let px = &rgba[offset..offset + 3];
                (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0
            })
            .collect();

        let total: f64 = samples.iter().sum();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let edges = samples
            .windows(2)
            .filter(|w| (w[1] - w[0]).abs() > EDGE_DELTA)
            .count();

        let brightness = total / sample_count as f64 / 255.0;
        let contrast = (max - min) / 255.0;
        let complexity = (edges as f64 / sample_count as f64 * COMPLEXITY_SCALE).min(1.0);

        ImageFeatures {
            brightness: brightness.clamp(0.0, 1.0),
            contrast: contrast.clamp(0.0, 1.0),
            complexity,
        }
    }

    pub fn extract_image(&self, img: &DynamicImage) -> ImageFeatures {
        self.extract(img.to_rgba8().as_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(pixels: usize, value: u8) -> Vec<u8> {
        std::iter::repeat([value, value, value, 255])
            .take(pixels)
            .flatten()
            .collect()
    }

    #[test]
    fn test_empty_buffer() {
        let f = FeatureExtractor::default().extract(&[]);
        assert_eq!(f, ImageFeatures::default());
    }

    #[test]
    fn test_solid_white() {
        let f = FeatureExtractor::default().extract(&solid(500, 255));
        assert!((f.brightness - 1.0).abs() < 1e-9);
        assert_eq!(f.contrast, 0.0);
        assert_eq!(f.complexity, 0.0);
    }

    #[test]
    fn test_alternating_pixels_are_complex() {
        let mut buf = Vec::new();
        for i in 0..1000 {
            let v = if i % 2 == 0 { 0 } else { 255 };
            buf.extend_from_slice(&[v, v, v, 255]);
        }
        let f = FeatureExtractor::default().extract(&buf);
        assert!((f.brightness - 0.5).abs() < 0.01);
        assert!((f.contrast - 1.0).abs() < 1e-9);
        assert_eq!(f.complexity, 1.0);
    }

    #[test]
    fn test_small_steps_are_not_edges() {
        let mut buf = Vec::new();
        for i in 0..200u32 {
            let v = (i % 20) as u8 * 10;
            buf.extend_from_slice(&[v, v, v, 255]);
        }
        let f = FeatureExtractor::default().extract(&buf);
        // only the 190 -> 0 wraparounds exceed the delta
        assert!(f.complexity < 0.6);
        assert!(f.complexity > 0.0);
    }

    #[test]
    fn test_sampling_is_bounded() {
        let extractor = FeatureExtractor::new(100);
        let mut buf = solid(10_000, 0);
        // every 100th pixel is what the stride reads
        for i in (0..10_000).step_by(100) {
            buf[i * 4..i * 4 + 3].copy_from_slice(&[255, 255, 255]);
        }
        let f = extractor.extract(&buf);
        assert!((f.brightness - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_features_in_unit_range() {
        let buf: Vec<u8> = (0..40_000u32).map(|i| (i * 37 % 251) as u8).collect();
        let f = FeatureExtractor::default().extract(&buf);
        for v in [f.brightness, f.contrast, f.complexity] {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
