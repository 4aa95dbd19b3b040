//! Equidistant fisheye camera.
//!
//! The image radius grows with the angle θ between the ray and the optical
//! axis rather than with `tan θ`, so fields of view near 180° still map to a
//! finite image. Only rays strictly in front of the sensor (θ < 90°) are
//! unprojected.

use serde::{Deserialize, Serialize};
use voxfuse_types::Vec3;

use crate::image::Pixel;
use crate::intrinsics::{EquidistantCoefficients, Intrinsics};
use crate::model::CameraModel;

/// Largest off-axis angle used for frustum corner rays (≈ 85°).
const MAX_CORNER_THETA: f32 = 1.48;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FisheyeCamera {
    pub intrinsics: Intrinsics,
    #[serde(default)]
    pub coefficients: EquidistantCoefficients,
}

impl FisheyeCamera {
    pub fn new(intrinsics: Intrinsics, coefficients: EquidistantCoefficients) -> Self {
        Self {
            intrinsics,
            coefficients,
        }
    }

    /// Unit-depth ray for normalised fisheye coordinates, with θ limited to
    /// `max_theta`. `None` when θ would reach the image plane.
    fn ray(&self, pixel: Pixel, max_theta: Option<f32>) -> Option<Vec3> {
        if !pixel.u.is_finite() || !pixel.v.is_finite() {
            return None;
        }
        let (xd, yd) = self.intrinsics.normalise(pixel.u, pixel.v);
        let theta_d = (xd * xd + yd * yd).sqrt();
        if theta_d < 1e-8 {
            return Some(Vec3::new(xd, yd, 1.0));
        }
        let mut theta = self.coefficients.undistort_angle(theta_d);
        if let Some(limit) = max_theta {
            theta = theta.min(limit);
        }
        if !theta.is_finite() || theta < 0.0 || theta >= std::f32::consts::FRAC_PI_2 {
            return None;
        }
        let scale = theta.tan() / theta_d;
        Some(Vec3::new(xd * scale, yd * scale, 1.0))
    }
}

impl CameraModel for FisheyeCamera {
    fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    fn project_point(&self, p: Vec3) -> Option<Pixel> {
        if !p.is_finite() || p.z <= 0.0 {
            return None;
        }
        let (a, b) = (p.x / p.z, p.y / p.z);
        let r = (a * a + b * b).sqrt();
        let scale = if r < 1e-8 {
            1.0
        } else {
            self.coefficients.distort_angle(r.atan()) / r
        };
        let (u, v) = self.intrinsics.denormalise(a * scale, b * scale);
        Some(Pixel::new(u, v))
    }

    fn unproject_pixel(&self, pixel: Pixel, depth: f32) -> Option<Vec3> {
        if !depth.is_finite() || depth <= 0.0 {
            return None;
        }
        self.ray(pixel, None).map(|r| r * depth)
    }

    fn corner_ray(&self, pixel: Pixel) -> Option<Vec3> {
        self.ray(pixel, Some(MAX_CORNER_THETA))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxfuse_types::Transform3D;

    fn camera() -> FisheyeCamera {
        FisheyeCamera::new(
            Intrinsics::centred(200.0, 640, 480),
            EquidistantCoefficients {
                k1: 0.01,
                k2: -0.002,
                k3: 0.0,
                k4: 0.0,
            },
        )
    }

    #[test]
    fn optical_axis_hits_principal_point() {
        let px = camera().project_point(Vec3::new(0.0, 0.0, 1.0)).unwrap();
        assert!((px.u - 319.5).abs() < 1e-4);
        assert!((px.v - 239.5).abs() < 1e-4);
    }

    #[test]
    fn wide_angle_roundtrip() {
        let cam = camera();
        // Roughly 60° off axis.
        let p = Vec3::new(1.5, 0.4, 1.0);
        let px = cam.project_point(p).unwrap();
        let back = cam.unproject_pixel(px, 1.0).unwrap();
        assert!((back.x - p.x).abs() < 1e-3, "x={}", back.x);
        assert!((back.y - p.y).abs() < 1e-3, "y={}", back.y);
    }

    #[test]
    fn ray_beyond_ninety_degrees_is_invalid() {
        // Normalised radius 2.0 > π/2 with zero coefficients.
        let cam = FisheyeCamera::new(
            Intrinsics::centred(100.0, 640, 480),
            EquidistantCoefficients::default(),
        );
        assert!(cam.unproject_pixel(Pixel::new(519.5, 239.5), 1.0).is_none());
    }

    #[test]
    fn corner_rays_are_clamped_forward() {
        let cam = FisheyeCamera::new(
            Intrinsics::centred(100.0, 640, 480),
            EquidistantCoefficients::default(),
        );
        let ray = cam.corner_ray(Pixel::new(-0.5, -0.5)).unwrap();
        assert!(ray.z > 0.0);
        assert!(cam
            .compute_frustum(&Transform3D::identity(), 0.1, 3.0)
            .is_some());
    }
}
