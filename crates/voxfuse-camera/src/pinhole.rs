//! Pinhole camera with optional radial-tangential lens distortion.

use serde::{Deserialize, Serialize};
use voxfuse_types::Vec3;

use crate::image::Pixel;
use crate::intrinsics::{Intrinsics, RadialTangential};
use crate::model::CameraModel;

/// A pinhole projection `u = fx·x/z + cx`, `v = fy·y/z + cy`, optionally
/// followed by Brown–Conrady distortion of the normalised coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub intrinsics: Intrinsics,
    #[serde(default)]
    pub distortion: RadialTangential,
}

impl PinholeCamera {
    /// An undistorted pinhole camera.
    pub fn new(intrinsics: Intrinsics) -> Self {
        Self {
            intrinsics,
            distortion: RadialTangential::default(),
        }
    }

    pub fn with_distortion(intrinsics: Intrinsics, distortion: RadialTangential) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }
}

impl CameraModel for PinholeCamera {
    fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    fn project_point(&self, p: Vec3) -> Option<Pixel> {
        if !p.is_finite() || p.z <= 0.0 {
            return None;
        }
        let (x, y) = self.distortion.distort(p.x / p.z, p.y / p.z);
        let (u, v) = self.intrinsics.denormalise(x, y);
        Some(Pixel::new(u, v))
    }

    fn unproject_pixel(&self, pixel: Pixel, depth: f32) -> Option<Vec3> {
        if !depth.is_finite() || depth <= 0.0 || !pixel.u.is_finite() || !pixel.v.is_finite() {
            return None;
        }
        let (xd, yd) = self.intrinsics.normalise(pixel.u, pixel.v);
        let (x, y) = self.distortion.undistort(xd, yd);
        Some(Vec3::new(x * depth, y * depth, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> PinholeCamera {
        PinholeCamera::new(Intrinsics::new(525.0, 525.0, 319.5, 239.5, 640, 480))
    }

    #[test]
    fn principal_axis_projects_to_principal_point() {
        let px = camera().project_point(Vec3::new(0.0, 0.0, 3.0)).unwrap();
        assert!((px.u - 319.5).abs() < 1e-4);
        assert!((px.v - 239.5).abs() < 1e-4);
    }

    #[test]
    fn offset_point_scales_with_focal_length() {
        // x/z = 0.1 → 52.5 px right of cx.
        let px = camera().project_point(Vec3::new(0.2, -0.1, 2.0)).unwrap();
        assert!((px.u - 372.0).abs() < 1e-3);
        assert!((px.v - 213.25).abs() < 1e-3);
    }

    #[test]
    fn point_on_image_plane_is_invalid() {
        assert!(camera().project_point(Vec3::new(1.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn unproject_keeps_depth_on_z() {
        let p = camera().unproject_pixel(Pixel::new(100.0, 400.0), 2.5).unwrap();
        assert!((p.z - 2.5).abs() < 1e-6);
        let px = camera().project_point(p).unwrap();
        assert!((px.u - 100.0).abs() < 1e-3);
        assert!((px.v - 400.0).abs() < 1e-3);
    }

    #[test]
    fn negative_or_nan_depth_is_invalid() {
        assert!(camera().unproject_pixel(Pixel::new(1.0, 1.0), -1.0).is_none());
        assert!(camera().unproject_pixel(Pixel::new(1.0, 1.0), f32::NAN).is_none());
    }

    #[test]
    fn distorted_roundtrip() {
        let cam = PinholeCamera::with_distortion(
            Intrinsics::new(525.0, 525.0, 319.5, 239.5, 640, 480),
            RadialTangential {
                k1: -0.2,
                k2: 0.05,
                p1: 0.001,
                p2: -0.001,
                k3: 0.0,
            },
        );
        let px = Pixel::new(50.0, 420.0);
        let p = cam.unproject_pixel(px, 1.2).unwrap();
        let back = cam.project_point(p).unwrap();
        assert!((back.u - px.u).abs() < 0.05, "u={}", back.u);
        assert!((back.v - px.v).abs() < 0.05, "v={}", back.v);
    }
}
