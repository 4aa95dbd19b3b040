//! View frustum: a query predicate over axis-aligned boxes.
//!
//! Built from the eight world-space corners of the viewing volume (four
//! image-corner rays cut at the near and far distances). Each of the six
//! planes stores an inward-facing normal, so a point is inside when its
//! signed distance to every plane is non-negative.

use voxfuse_types::{Aabb, Vec3};

/// An oriented plane `n · p + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Plane through three points, normal oriented so that `inside` lies on
    /// the positive side.
    fn through(a: Vec3, b: Vec3, c: Vec3, inside: Vec3) -> Self {
        let normal = (b - a).cross(c - a).normalize_or_zero();
        let plane = Self {
            normal,
            d: -normal.dot(a),
        };
        if plane.signed_distance(inside) < 0.0 {
            Self {
                normal: -plane.normal,
                d: -plane.d,
            }
        } else {
            plane
        }
    }

    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// Six half-spaces bounding a camera's viewing volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
    corners: [Vec3; 8],
}

impl Frustum {
    /// Build a frustum from its corners.
    ///
    /// `corners[0..4]` are the near-plane corners and `corners[4..8]` the
    /// matching far-plane corners, both in the winding top-left, top-right,
    /// bottom-right, bottom-left.
    pub fn from_corners(corners: [Vec3; 8]) -> Self {
        let centroid = corners.iter().fold(Vec3::zero(), |acc, c| acc + *c) * (1.0 / 8.0);
        let c = &corners;
        let planes = [
            Plane::through(c[0], c[1], c[2], centroid), // near
            Plane::through(c[4], c[5], c[6], centroid), // far
            Plane::through(c[0], c[3], c[7], centroid), // left
            Plane::through(c[1], c[2], c[6], centroid), // right
            Plane::through(c[0], c[1], c[5], centroid), // top
            Plane::through(c[3], c[2], c[6], centroid), // bottom
        ];
        Self { planes, corners }
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    pub fn corners(&self) -> &[Vec3; 8] {
        &self.corners
    }

    /// World-space box enclosing the frustum.
    pub fn bounding_box(&self) -> Aabb {
        let (min, max) = self.corners[1..]
            .iter()
            .fold((self.corners[0], self.corners[0]), |(lo, hi), p| {
                (lo.min(*p), hi.max(*p))
            });
        Aabb { min, max }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|pl| pl.signed_distance(p) >= 0.0)
    }

    /// Conservative box test: `false` only when the box lies entirely
    /// outside at least one plane. Boxes near frustum edges may report
    /// `true` without actually overlapping.
    pub fn intersects_aabb(&self, b: &Aabb) -> bool {
        self.planes.iter().all(|pl| {
            // Box vertex furthest along the plane normal.
            let positive = Vec3::new(
                if pl.normal.x >= 0.0 { b.max.x } else { b.min.x },
                if pl.normal.y >= 0.0 { b.max.y } else { b.min.y },
                if pl.normal.z >= 0.0 { b.max.z } else { b.min.z },
            );
            pl.signed_distance(positive) >= 0.0
        })
    }
}
