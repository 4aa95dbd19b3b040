//! Depth and colour sample buffers.
//!
//! Both buffers are row-major (`index = col + row * width`). Depth samples
//! are metres along the camera's principal axis; `0.0` or a non-finite value
//! means "no reading".

use serde::{Deserialize, Serialize};
use voxfuse_types::Rgb;

// ────────────────────────────────────────────────────────────────────────────
// Pixel
// ────────────────────────────────────────────────────────────────────────────

/// A continuous image coordinate. Pixel centres sit at integer values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    /// Column coordinate.
    pub u: f32,
    /// Row coordinate.
    pub v: f32,
}

impl Pixel {
    pub fn new(u: f32, v: f32) -> Self {
        Self { u, v }
    }

    /// Nearest sample `(col, row)` inside a `width × height` image.
    ///
    /// Rounds half up (`floor(u + 0.5)`), so `u ∈ [-0.5, width - 0.5)` maps
    /// inside and a coordinate exactly on the right/bottom edge
    /// (`width - 0.5`) does not.
    pub fn to_index(self, width: u32, height: u32) -> Option<(u32, u32)> {
        if !self.u.is_finite() || !self.v.is_finite() {
            return None;
        }
        let col = (self.u + 0.5).floor();
        let row = (self.v + 0.5).floor();
        if col < 0.0 || row < 0.0 || col >= width as f32 || row >= height as f32 {
            return None;
        }
        Some((col as u32, row as u32))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DepthImage
// ────────────────────────────────────────────────────────────────────────────

/// A dense depth map in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthImage {
    /// An image with every sample set to `0.0` (no reading).
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// An image with every sample set to `depth`.
    pub fn filled(width: u32, height: u32, depth: f32) -> Self {
        Self {
            width,
            height,
            data: vec![depth; width as usize * height as usize],
        }
    }

    /// Wrap an existing row-major buffer.
    ///
    /// Returns `None` when `data.len() != width * height`.
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Convert a 16-bit millimetre depth map (the common structured-light
    /// sensor encoding) to metres. `0` stays "no reading".
    pub fn from_millimeters(width: u32, height: u32, raw: &[u16]) -> Option<Self> {
        let data = raw.iter().map(|&mm| mm as f32 * 0.001).collect();
        Self::from_vec(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn is_inside(&self, col: u32, row: u32) -> bool {
        col < self.width && row < self.height
    }

    /// Sample at `(col, row)`.
    ///
    /// # Panics
    ///
    /// Panics when the coordinate is outside the image.
    pub fn at(&self, col: u32, row: u32) -> f32 {
        self.data[self.index(col, row)]
    }

    /// Sample at `(col, row)`, or `None` outside the image.
    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        self.is_inside(col, row).then(|| self.at(col, row))
    }

    pub fn set(&mut self, col: u32, row: u32, depth: f32) {
        let idx = self.index(col, row);
        self.data[idx] = depth;
    }

    fn index(&self, col: u32, row: u32) -> usize {
        col as usize + row as usize * self.width as usize
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ColorImage
// ────────────────────────────────────────────────────────────────────────────

/// Channel layout of an 8-bit colour buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgb8,
    Rgba8,
    Bgr8,
    Bgra8,
    Mono8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Mono8 => 1,
        }
    }
}

/// A dense 8-bit colour image aligned with a depth image.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl ColorImage {
    /// Wrap an interleaved buffer.
    ///
    /// Returns `None` when `data.len() != width * height * channels`.
    pub fn from_vec(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * format.channels();
        (data.len() == expected).then_some(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// An RGB image with every pixel set to `color`.
    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        let data = std::iter::repeat_n([color.r, color.g, color.b], width as usize * height as usize)
            .flatten()
            .collect();
        Self {
            width,
            height,
            format: PixelFormat::Rgb8,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Colour at `(col, row)` normalised to RGB.
    ///
    /// # Panics
    ///
    /// Panics when the coordinate is outside the image.
    pub fn at(&self, col: u32, row: u32) -> Rgb {
        let ch = self.format.channels();
        let base = (col as usize + row as usize * self.width as usize) * ch;
        let px = &self.data[base..base + ch];
        match self.format {
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => Rgb::new(px[0], px[1], px[2]),
            PixelFormat::Bgr8 | PixelFormat::Bgra8 => Rgb::new(px[2], px[1], px[0]),
            PixelFormat::Mono8 => Rgb::new(px[0], px[0], px[0]),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PixelMask
// ────────────────────────────────────────────────────────────────────────────

/// Per-pixel validity of a sensor: pixels that are `false` never yield a
/// depth sample (lens vignetting, a robot body part in view, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct PixelMask {
    width: u32,
    height: u32,
    valid: Vec<bool>,
}

impl PixelMask {
    /// A mask with every pixel usable.
    pub fn all_valid(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            valid: vec![true; width as usize * height as usize],
        }
    }

    /// Wrap a row-major validity buffer.
    ///
    /// Returns `None` when `valid.len() != width * height`.
    pub fn from_vec(width: u32, height: u32, valid: Vec<bool>) -> Option<Self> {
        (valid.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            valid,
        })
    }

    /// Build from a mask image: black pixels are masked out, anything else
    /// is usable.
    pub fn from_image(image: &ColorImage) -> Self {
        let valid = (0..image.height())
            .flat_map(|row| (0..image.width()).map(move |col| (col, row)))
            .map(|(col, row)| image.at(col, row) != Rgb::default())
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            valid,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// False for masked pixels and for coordinates outside the mask.
    pub fn is_valid(&self, col: u32, row: u32) -> bool {
        col < self.width
            && row < self.height
            && self.valid[col as usize + row as usize * self.width as usize]
    }

    pub fn set(&mut self, col: u32, row: u32, valid: bool) {
        if col < self.width && row < self.height {
            self.valid[col as usize + row as usize * self.width as usize] = valid;
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Pixel ───────────────────────────────────────────────────────────────

    #[test]
    fn pixel_rounds_to_nearest_centre() {
        assert_eq!(Pixel::new(2.49, 0.51).to_index(4, 4), Some((2, 1)));
        assert_eq!(Pixel::new(2.5, 0.0).to_index(4, 4), Some((3, 0)));
    }

    #[test]
    fn pixel_left_and_top_edges_are_inside() {
        assert_eq!(Pixel::new(-0.5, -0.5).to_index(4, 3), Some((0, 0)));
    }

    #[test]
    fn pixel_right_and_bottom_edges_are_outside() {
        // width - 0.5 rounds to column `width`, which does not exist.
        assert_eq!(Pixel::new(3.5, 1.0).to_index(4, 3), None);
        assert_eq!(Pixel::new(1.0, 2.5).to_index(4, 3), None);
        assert_eq!(Pixel::new(3.499, 2.499).to_index(4, 3), Some((3, 2)));
    }

    #[test]
    fn pixel_nan_is_outside() {
        assert_eq!(Pixel::new(f32::NAN, 1.0).to_index(4, 4), None);
    }

    // ── DepthImage ──────────────────────────────────────────────────────────

    #[test]
    fn depth_from_vec_rejects_wrong_length() {
        assert!(DepthImage::from_vec(2, 2, vec![1.0; 3]).is_none());
        assert!(DepthImage::from_vec(2, 2, vec![1.0; 4]).is_some());
    }

    #[test]
    fn depth_from_millimeters_converts_to_metres() {
        let img = DepthImage::from_millimeters(2, 1, &[1500, 0]).unwrap();
        assert!((img.at(0, 0) - 1.5).abs() < 1e-6);
        assert_eq!(img.at(1, 0), 0.0);
    }

    #[test]
    fn depth_get_outside_is_none() {
        let mut img = DepthImage::new(3, 2);
        img.set(2, 1, 4.0);
        assert_eq!(img.get(2, 1), Some(4.0));
        assert_eq!(img.get(3, 0), None);
        assert_eq!(img.get(0, 2), None);
    }

    // ── ColorImage ──────────────────────────────────────────────────────────

    #[test]
    fn bgr_is_swizzled_to_rgb() {
        let img = ColorImage::from_vec(1, 1, PixelFormat::Bgr8, vec![1, 2, 3]).unwrap();
        assert_eq!(img.at(0, 0), Rgb::new(3, 2, 1));
    }

    #[test]
    fn mono_is_replicated() {
        let img = ColorImage::from_vec(2, 1, PixelFormat::Mono8, vec![7, 9]).unwrap();
        assert_eq!(img.at(1, 0), Rgb::new(9, 9, 9));
    }

    #[test]
    fn color_from_vec_rejects_wrong_length() {
        assert!(ColorImage::from_vec(2, 2, PixelFormat::Rgba8, vec![0; 15]).is_none());
    }

    #[test]
    fn filled_color_image_has_uniform_pixels() {
        let img = ColorImage::filled(3, 2, Rgb::new(10, 20, 30));
        assert_eq!(img.at(2, 1), Rgb::new(10, 20, 30));
        assert_eq!(img.format(), PixelFormat::Rgb8);
    }

    // ── PixelMask ───────────────────────────────────────────────────────────

    #[test]
    fn mask_from_image_drops_black_pixels() {
        let img = ColorImage::from_vec(3, 1, PixelFormat::Mono8, vec![0, 255, 12]).unwrap();
        let mask = PixelMask::from_image(&img);
        assert!(!mask.is_valid(0, 0));
        assert!(mask.is_valid(1, 0));
        assert!(mask.is_valid(2, 0));
        assert_eq!(mask.valid_count(), 2);
    }

    #[test]
    fn mask_outside_is_invalid() {
        let mut mask = PixelMask::all_valid(2, 2);
        assert!(mask.is_valid(1, 1));
        assert!(!mask.is_valid(2, 0));
        mask.set(1, 1, false);
        assert!(!mask.is_valid(1, 1));
        assert!(PixelMask::from_vec(2, 2, vec![true; 3]).is_none());
    }
}
