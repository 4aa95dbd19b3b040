//! Synthetic scenes rendered into depth and colour frames.
//!
//! Each pixel's ray is cast at unit depth, so the hit parameter along the
//! ray is the camera-frame depth directly.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use voxfuse_camera::{CameraModel, ColorImage, DepthImage, PinholeCamera, Pixel, PixelFormat};
use voxfuse_types::{Aabb, Quaternion, Rgb, Transform3D, Vec3};

/// Distance of the back wall from the world origin along +Z.
const WALL_Z: f32 = 2.0;

/// Which scene to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scene {
    /// A single wall facing the camera.
    #[default]
    Plane,
    /// The wall with a box standing in front of it.
    Box,
}

impl std::fmt::Display for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scene::Plane => write!(f, "plane"),
            Scene::Box => write!(f, "box"),
        }
    }
}

impl Scene {
    fn obstacle(self) -> Option<Aabb> {
        match self {
            Scene::Plane => None,
            Scene::Box => Some(Aabb::new(
                Vec3::new(-0.25, -0.25, 1.2),
                Vec3::new(0.25, 0.25, 1.6),
            )),
        }
    }

    /// Nearest hit along `origin + t·dir` with `t > 0`.
    fn cast(self, origin: Vec3, dir: Vec3) -> Option<(f32, Vec3)> {
        let wall = (dir.z > 1e-6)
            .then(|| (WALL_Z - origin.z) / dir.z)
            .filter(|t| *t > 0.0);
        let obstacle = self.obstacle().and_then(|b| ray_box(origin, dir, &b));
        let t = match (wall, obstacle) {
            (Some(a), Some(b)) => a.min(b),
            (a, b) => a.or(b)?,
        };
        Some((t, origin + dir * t))
    }

    /// Depth frame seen by `camera` at `pose`. Pixels that hit nothing are
    /// left invalid.
    pub fn render_depth(self, camera: &PinholeCamera, pose: &Transform3D) -> DepthImage {
        let k = camera.intrinsics;
        let mut depth = DepthImage::new(k.width, k.height);
        for row in 0..k.height {
            for col in 0..k.width {
                if let Some((t, _)) = self.cast_pixel(camera, pose, col, row) {
                    depth.set(col, row, t);
                }
            }
        }
        depth
    }

    /// Colour frame aligned with [`render_depth`][Self::render_depth]: a
    /// 20 cm checkerboard on the wall, a flat orange on the box.
    pub fn render_color(self, camera: &PinholeCamera, pose: &Transform3D) -> ColorImage {
        let k = camera.intrinsics;
        let mut data = Vec::with_capacity(k.width as usize * k.height as usize * 3);
        for row in 0..k.height {
            for col in 0..k.width {
                let c = match self.cast_pixel(camera, pose, col, row) {
                    Some((_, hit)) => self.shade(hit),
                    None => Rgb::default(),
                };
                data.extend_from_slice(&[c.r, c.g, c.b]);
            }
        }
        ColorImage::from_vec(k.width, k.height, PixelFormat::Rgb8, data)
            .unwrap_or_else(|| ColorImage::filled(k.width, k.height, Rgb::default()))
    }

    fn cast_pixel(
        self,
        camera: &PinholeCamera,
        pose: &Transform3D,
        col: u32,
        row: u32,
    ) -> Option<(f32, Vec3)> {
        let ray = camera.unproject_pixel(Pixel::new(col as f32, row as f32), 1.0)?;
        self.cast(pose.translation, pose.rotation.rotate(ray))
    }

    fn shade(self, hit: Vec3) -> Rgb {
        if self.obstacle().is_some_and(|b| hit.z < WALL_Z - 1e-3 && b.contains_point(hit)) {
            return Rgb::new(230, 140, 40);
        }
        let cell = (hit.x / 0.2).floor() as i32 + (hit.y / 0.2).floor() as i32;
        if cell.rem_euclid(2) == 0 {
            Rgb::new(200, 200, 200)
        } else {
            Rgb::new(60, 60, 90)
        }
    }
}

/// Slab test; returns the entry distance, or the exit distance when the
/// origin is inside the box.
fn ray_box(origin: Vec3, dir: Vec3, b: &Aabb) -> Option<f32> {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    for axis in 0..3 {
        let (o, d) = (origin[axis], dir[axis]);
        if d.abs() < 1e-9 {
            if o < b.min[axis] || o > b.max[axis] {
                return None;
            }
            continue;
        }
        let (t0, t1) = ((b.min[axis] - o) / d, (b.max[axis] - o) / d);
        t_near = t_near.max(t0.min(t1));
        t_far = t_far.min(t0.max(t1));
    }
    if t_near > t_far || t_far <= 0.0 {
        return None;
    }
    Some(if t_near > 0.0 { t_near } else { t_far })
}

/// `frames` poses on a horizontal sweep from x = -0.4 m to x = +0.4 m, each
/// yawed slightly towards the scene centre.
pub fn sweep(frames: usize) -> Vec<Transform3D> {
    let up = Vec3::new(0.0, 1.0, 0.0);
    (0..frames)
        .map(|n| {
            let s = if frames > 1 {
                n as f32 / (frames - 1) as f32
            } else {
                0.5
            };
            let x = -0.4 + 0.8 * s;
            Transform3D::new(Vec3::new(x, 0.0, 0.0), Quaternion::from_axis_angle(up, -0.25 * x))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxfuse_camera::Intrinsics;

    fn camera() -> PinholeCamera {
        PinholeCamera::new(Intrinsics::centred(80.0, 41, 31))
    }

    #[test]
    fn parses_scene_names() {
        assert_eq!(Scene::from_str("plane", false).unwrap(), Scene::Plane);
        assert_eq!(Scene::from_str("BOX", true).unwrap(), Scene::Box);
        assert!(Scene::from_str("sphere", true).is_err());
        assert_eq!(Scene::Box.to_string(), "box");
    }

    #[test]
    fn plane_depth_is_wall_distance() {
        let depth = Scene::Plane.render_depth(&camera(), &Transform3D::identity());
        // Fronto-parallel wall: every pixel reads the same depth.
        for row in 0..31 {
            for col in 0..41 {
                assert!((depth.at(col, row) - WALL_Z).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn box_occludes_the_wall_at_the_centre() {
        let depth = Scene::Box.render_depth(&camera(), &Transform3D::identity());
        assert!((depth.at(20, 15) - 1.2).abs() < 1e-5);
        assert!((depth.at(0, 0) - WALL_Z).abs() < 1e-5);
    }

    #[test]
    fn camera_facing_away_sees_nothing() {
        let pose = Transform3D::new(
            Vec3::zero(),
            Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), std::f32::consts::PI),
        );
        let depth = Scene::Plane.render_depth(&camera(), &pose);
        assert!(depth.data().iter().all(|d| *d == 0.0));
    }

    #[test]
    fn color_matches_depth_size() {
        let cam = camera();
        let color = Scene::Box.render_color(&cam, &Transform3D::identity());
        assert_eq!((color.width(), color.height()), (41, 31));
        assert_eq!(color.at(20, 15), Rgb::new(230, 140, 40));
    }

    #[test]
    fn ray_box_handles_inside_origin() {
        let b = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let t = ray_box(Vec3::zero(), Vec3::new(0.0, 0.0, 1.0), &b).unwrap();
        assert!((t - 1.0).abs() < 1e-6);
        assert!(ray_box(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 0.0, 1.0), &b).is_none());
    }

    #[test]
    fn sweep_is_symmetric() {
        let poses = sweep(5);
        assert_eq!(poses.len(), 5);
        assert!((poses[0].translation.x + 0.4).abs() < 1e-6);
        assert!((poses[4].translation.x - 0.4).abs() < 1e-6);
        assert!(poses[2].translation.x.abs() < 1e-6);
        assert_eq!(sweep(1)[0].translation.x, 0.0);
    }
}
