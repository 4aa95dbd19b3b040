//! `voxfuse-types` – shared vocabulary of the voxfuse workspace.
//!
//! # Modules
//!
//! - [`geometry`] – [`Vec3`][geometry::Vec3], [`Quaternion`][geometry::Quaternion],
//!   [`Transform3D`][geometry::Transform3D] (sensor poses) and
//!   [`Aabb`][geometry::Aabb] (chunk bounds).
//!
//! The crate root holds the [`Rgb`] colour sample and the workspace-wide
//! [`FusionError`] taxonomy returned by every fusion entry point.

pub mod geometry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use geometry::{Aabb, Mat3, Quaternion, RigidMotion, Transform3D, Vec3};

/// An 8-bit RGB colour sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Weighted running average of two colours, rounded to the nearest step.
    ///
    /// `self` carries `old_weight`, `sample` carries `inc_weight`.
    pub fn blend(self, old_weight: f32, sample: Rgb, inc_weight: f32) -> Rgb {
        let total = old_weight + inc_weight;
        if total <= 0.0 {
            return sample;
        }
        let mix = |a: u8, b: u8| -> u8 {
            let v = (a as f32 * old_weight + b as f32 * inc_weight) / total;
            v.round().clamp(0.0, 255.0) as u8
        };
        Rgb::new(mix(self.r, sample.r), mix(self.g, sample.g), mix(self.b, sample.b))
    }

    /// Linear interpolation between two colours (`t` in `[0, 1]`).
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        self.blend(1.0 - t, other, t)
    }
}

/// Rejection reasons surfaced by the fusion engine.
///
/// Every integration, export and configuration call returns one of these
/// instead of panicking; the caller (transport layer) decides whether to
/// drop or resend.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FusionError {
    #[error(
        "Invalid frame: expected {expected_width}x{expected_height}, got {width}x{height}"
    )]
    InvalidFrame {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Invalid pose: {0}")]
    InvalidPose(String),

    #[error("Unknown sensor model: {0}")]
    UnknownSensor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Mesh export failed: {0}")]
    Export(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_with_zero_old_weight_takes_sample() {
        let c = Rgb::new(10, 20, 30).blend(0.0, Rgb::new(200, 100, 50), 1.0);
        assert_eq!(c, Rgb::new(200, 100, 50));
    }

    #[test]
    fn blend_equal_weights_averages() {
        let c = Rgb::new(0, 100, 200).blend(1.0, Rgb::new(100, 200, 0), 1.0);
        assert_eq!(c, Rgb::new(50, 150, 100));
    }

    #[test]
    fn lerp_endpoints() {
        let a = Rgb::new(0, 0, 0);
        let b = Rgb::new(255, 255, 255);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn fusion_error_display() {
        let err = FusionError::InvalidFrame {
            expected_width: 640,
            expected_height: 480,
            width: 320,
            height: 240,
        };
        let text = err.to_string();
        assert!(text.contains("640x480"));
        assert!(text.contains("320x240"));

        let err2 = FusionError::UnknownSensor("depth_front".to_string());
        assert!(err2.to_string().contains("depth_front"));
    }

    #[test]
    fn fusion_error_serialization_roundtrip() {
        let err = FusionError::InvalidPose("translation contains NaN".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: FusionError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
