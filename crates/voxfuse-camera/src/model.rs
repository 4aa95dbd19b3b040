//! The [`CameraModel`] capability set and the [`SensorModel`] selector.
//!
//! Integrators are written against [`CameraModel`] and monomorphised per
//! variant; the concrete variant is picked once, when a sensor is
//! registered, through the [`SensorModel`] enum.

use serde::{Deserialize, Serialize};
use voxfuse_types::{Transform3D, Vec3};

use crate::fisheye::FisheyeCamera;
use crate::frustum::Frustum;
use crate::image::Pixel;
use crate::intrinsics::Intrinsics;
use crate::pinhole::PinholeCamera;

/// Project / unproject / frustum capability of a calibrated sensor.
///
/// Implementors provide the two camera-frame primitives; the pose-aware
/// operations are derived from them. The camera frame is the optical frame
/// (+Z forward, +X right, +Y down) and *depth* is the Z coordinate.
pub trait CameraModel: Send + Sync {
    fn intrinsics(&self) -> &Intrinsics;

    /// Camera-frame point → continuous pixel coordinate, without any image
    /// bounds check. `None` for points at or behind the image plane or for
    /// non-finite input.
    fn project_point(&self, p: Vec3) -> Option<Pixel>;

    /// Pixel + depth → camera-frame point. `None` when `depth` is not a
    /// positive finite value or the pixel has no forward-facing ray.
    fn unproject_pixel(&self, pixel: Pixel, depth: f32) -> Option<Vec3>;

    /// Ray through `pixel` scaled to unit depth, used for frustum corners.
    ///
    /// Wide-angle models override this to clamp rays that would otherwise
    /// run parallel to the image plane.
    fn corner_ray(&self, pixel: Pixel) -> Option<Vec3> {
        self.unproject_pixel(pixel, 1.0)
    }

    /// World point → pixel for a sensor at `pose` (sensor → world).
    ///
    /// `None` (invalid) for a non-finite pose, a point behind the sensor, or
    /// a projection outside the calibrated image.
    fn project(&self, world: Vec3, pose: &Transform3D) -> Option<Pixel> {
        if !pose.is_finite() || !world.is_finite() {
            return None;
        }
        let pixel = self.project_point(pose.inverse().apply(world))?;
        let k = self.intrinsics();
        pixel.to_index(k.width, k.height).map(|_| pixel)
    }

    /// Pixel + depth → world point for a sensor at `pose`.
    fn unproject(&self, pixel: Pixel, depth: f32, pose: &Transform3D) -> Option<Vec3> {
        if !pose.is_finite() {
            return None;
        }
        self.unproject_pixel(pixel, depth).map(|p| pose.apply(p))
    }

    /// Viewing volume between `near` and `far` for a sensor at `pose`.
    ///
    /// The side planes pass through the outer edges of the corner pixels.
    fn compute_frustum(&self, pose: &Transform3D, near: f32, far: f32) -> Option<Frustum> {
        if !pose.is_finite() || !near.is_finite() || !far.is_finite() || near <= 0.0 || far <= near
        {
            return None;
        }
        let k = self.intrinsics();
        let (w, h) = (k.width as f32 - 0.5, k.height as f32 - 0.5);
        let image_corners = [
            Pixel::new(-0.5, -0.5),
            Pixel::new(w, -0.5),
            Pixel::new(w, h),
            Pixel::new(-0.5, h),
        ];
        let mut rays = [Vec3::zero(); 4];
        for (ray, px) in rays.iter_mut().zip(image_corners) {
            *ray = self.corner_ray(px)?;
        }
        let mut corners = [Vec3::zero(); 8];
        for (i, ray) in rays.iter().enumerate() {
            corners[i] = pose.apply(*ray * near);
            corners[i + 4] = pose.apply(*ray * far);
        }
        Some(Frustum::from_corners(corners))
    }
}

/// A sensor model chosen at configuration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum SensorModel {
    Pinhole(PinholeCamera),
    Fisheye(FisheyeCamera),
}

impl CameraModel for SensorModel {
    fn intrinsics(&self) -> &Intrinsics {
        match self {
            SensorModel::Pinhole(c) => c.intrinsics(),
            SensorModel::Fisheye(c) => c.intrinsics(),
        }
    }

    fn project_point(&self, p: Vec3) -> Option<Pixel> {
        match self {
            SensorModel::Pinhole(c) => c.project_point(p),
            SensorModel::Fisheye(c) => c.project_point(p),
        }
    }

    fn unproject_pixel(&self, pixel: Pixel, depth: f32) -> Option<Vec3> {
        match self {
            SensorModel::Pinhole(c) => c.unproject_pixel(pixel, depth),
            SensorModel::Fisheye(c) => c.unproject_pixel(pixel, depth),
        }
    }

    fn corner_ray(&self, pixel: Pixel) -> Option<Vec3> {
        match self {
            SensorModel::Pinhole(c) => c.corner_ray(pixel),
            SensorModel::Fisheye(c) => c.corner_ray(pixel),
        }
    }
}

impl From<PinholeCamera> for SensorModel {
    fn from(c: PinholeCamera) -> Self {
        SensorModel::Pinhole(c)
    }
}

impl From<FisheyeCamera> for SensorModel {
    fn from(c: FisheyeCamera) -> Self {
        SensorModel::Fisheye(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxfuse_types::Quaternion;

    fn pinhole() -> SensorModel {
        PinholeCamera::new(Intrinsics::centred(100.0, 64, 48)).into()
    }

    #[test]
    fn project_point_in_front_is_valid() {
        let cam = pinhole();
        let px = cam
            .project(Vec3::new(0.0, 0.0, 2.0), &Transform3D::identity())
            .unwrap();
        assert!((px.u - 31.5).abs() < 1e-4);
        assert!((px.v - 23.5).abs() < 1e-4);
    }

    #[test]
    fn project_point_behind_is_invalid() {
        let cam = pinhole();
        assert!(cam
            .project(Vec3::new(0.0, 0.0, -2.0), &Transform3D::identity())
            .is_none());
    }

    #[test]
    fn project_outside_image_is_invalid() {
        let cam = pinhole();
        // 100 px focal, 2 m depth: x = 2 m lands 100 px right of centre.
        assert!(cam
            .project(Vec3::new(2.0, 0.0, 2.0), &Transform3D::identity())
            .is_none());
    }

    #[test]
    fn nan_pose_yields_invalid() {
        let cam = pinhole();
        let pose = Transform3D::from_translation(Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(cam.project(Vec3::new(0.0, 0.0, 1.0), &pose).is_none());
        assert!(cam.unproject(Pixel::new(1.0, 1.0), 1.0, &pose).is_none());
        assert!(cam.compute_frustum(&pose, 0.1, 5.0).is_none());
    }

    #[test]
    fn zero_depth_yields_invalid() {
        let cam = pinhole();
        assert!(cam
            .unproject(Pixel::new(10.0, 10.0), 0.0, &Transform3D::identity())
            .is_none());
    }

    #[test]
    fn unproject_then_project_returns_pixel_with_pose() {
        let cam = pinhole();
        let pose = Transform3D::new(
            Vec3::new(1.0, -0.5, 0.2),
            Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 0.3),
        );
        let px = Pixel::new(12.0, 30.0);
        let world = cam.unproject(px, 1.7, &pose).unwrap();
        let back = cam.project(world, &pose).unwrap();
        assert!((back.u - px.u).abs() < 1e-3);
        assert!((back.v - px.v).abs() < 1e-3);
    }

    #[test]
    fn frustum_contains_points_seen_by_camera() {
        let cam = pinhole();
        let pose = Transform3D::identity();
        let f = cam.compute_frustum(&pose, 0.1, 4.0).unwrap();
        let seen = cam.unproject(Pixel::new(5.0, 40.0), 2.0, &pose).unwrap();
        assert!(f.contains_point(seen));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 5.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 0.05)));
    }

    #[test]
    fn frustum_rejects_bad_planes() {
        let cam = pinhole();
        assert!(cam.compute_frustum(&Transform3D::identity(), 0.0, 1.0).is_none());
        assert!(cam.compute_frustum(&Transform3D::identity(), 2.0, 1.0).is_none());
    }

    #[test]
    fn sensor_model_serializes_with_tag() {
        let json = serde_json::to_string(&pinhole()).unwrap();
        assert!(json.contains("\"model\":\"pinhole\""));
        let back: SensorModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pinhole());
    }
}
