//! Chunk addressing and the dense voxel block behind each chunk id.
//!
//! World space is tiled by boxes of `dims * resolution` metres. A chunk id is
//! the integer tile coordinate; voxel `(i, j, k)` of chunk `id` has its
//! centre at `origin(id) + (i + 0.5, j + 0.5, k + 0.5) * resolution`.
//!
//! ```rust
//! use voxfuse_fusion::chunk::{ChunkGeometry, ChunkId};
//! use voxfuse_types::Vec3;
//!
//! let g = ChunkGeometry::new([16, 16, 16], 0.05);
//! let (id, local) = g.locate(Vec3::new(-0.01, 0.81, 0.32)).unwrap();
//! assert_eq!(id, ChunkId::new(-1, 1, 0));
//! assert_eq!(local, [15, 0, 6]);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use voxfuse_types::{Aabb, Vec3};

use crate::mesh::Mesh;
use crate::voxel::Voxel;

// ────────────────────────────────────────────────────────────────────────────
// ChunkId
// ────────────────────────────────────────────────────────────────────────────

/// Integer tile coordinate of a chunk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ChunkId {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkId {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ChunkGeometry
// ────────────────────────────────────────────────────────────────────────────

/// Voxel counts per chunk and voxel size, shared by every chunk of a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkGeometry {
    pub dims: [usize; 3],
    pub resolution: f32,
}

impl ChunkGeometry {
    pub fn new(dims: [usize; 3], resolution: f32) -> Self {
        Self { dims, resolution }
    }

    pub fn voxel_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Edge lengths of a chunk in metres.
    pub fn chunk_size(&self) -> Vec3 {
        Vec3::new(
            self.dims[0] as f32 * self.resolution,
            self.dims[1] as f32 * self.resolution,
            self.dims[2] as f32 * self.resolution,
        )
    }

    /// Flat index of local voxel `(i, j, k)`.
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.dims[0] + k * self.dims[0] * self.dims[1]
    }

    /// Inverse of [`index`][Self::index].
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let plane = self.dims[0] * self.dims[1];
        [
            index % self.dims[0],
            (index % plane) / self.dims[0],
            index / plane,
        ]
    }

    pub fn origin(&self, id: ChunkId) -> Vec3 {
        let size = self.chunk_size();
        Vec3::new(
            id.x as f32 * size.x,
            id.y as f32 * size.y,
            id.z as f32 * size.z,
        )
    }

    pub fn bounds(&self, id: ChunkId) -> Aabb {
        let origin = self.origin(id);
        Aabb {
            min: origin,
            max: origin + self.chunk_size(),
        }
    }

    /// Centre of local voxel `(i, j, k)` of chunk `id`. Indices equal to the
    /// chunk dimension address the first voxel of the `+` neighbour.
    pub fn voxel_center(&self, id: ChunkId, i: usize, j: usize, k: usize) -> Vec3 {
        let r = self.resolution;
        self.origin(id)
            + Vec3::new(
                (i as f32 + 0.5) * r,
                (j as f32 + 0.5) * r,
                (k as f32 + 0.5) * r,
            )
    }

    /// Chunk id and local voxel coordinate of the voxel containing `p`.
    ///
    /// Computed from the global voxel index so that the chunk id and the
    /// local index always agree at tile borders. `None` for non-finite
    /// points or points too far out for `i32` chunk ids.
    pub fn locate(&self, p: Vec3) -> Option<(ChunkId, [usize; 3])> {
        if !p.is_finite() {
            return None;
        }
        let mut id = [0i32; 3];
        let mut local = [0usize; 3];
        for axis in 0..3 {
            let global = (p[axis] / self.resolution).floor();
            if global.abs() > i32::MAX as f32 / 2.0 {
                return None;
            }
            let global = global as i64;
            let dim = self.dims[axis] as i64;
            id[axis] = i32::try_from(global.div_euclid(dim)).ok()?;
            local[axis] = global.rem_euclid(dim) as usize;
        }
        Some((ChunkId::new(id[0], id[1], id[2]), local))
    }

    /// Chunk id containing `p`.
    pub fn chunk_id_at(&self, p: Vec3) -> Option<ChunkId> {
        self.locate(p).map(|(id, _)| id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Chunk
// ────────────────────────────────────────────────────────────────────────────

/// A dense block of voxels plus its cached surface mesh.
#[derive(Debug, Clone)]
pub struct Chunk {
    id: ChunkId,
    geometry: ChunkGeometry,
    voxels: Vec<Voxel>,
    dirty: bool,
    mesh: Option<Arc<Mesh>>,
}

impl Chunk {
    /// A chunk with every voxel unobserved.
    pub fn new(id: ChunkId, geometry: ChunkGeometry) -> Self {
        Self {
            id,
            geometry,
            voxels: vec![Voxel::UNOBSERVED; geometry.voxel_count()],
            dirty: false,
            mesh: None,
        }
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn geometry(&self) -> &ChunkGeometry {
        &self.geometry
    }

    pub fn bounds(&self) -> Aabb {
        self.geometry.bounds(self.id)
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    pub fn voxel(&self, i: usize, j: usize, k: usize) -> &Voxel {
        &self.voxels[self.geometry.index(i, j, k)]
    }

    pub fn voxel_mut(&mut self, i: usize, j: usize, k: usize) -> &mut Voxel {
        let idx = self.geometry.index(i, j, k);
        &mut self.voxels[idx]
    }

    pub fn observed_count(&self) -> usize {
        self.voxels.iter().filter(|v| v.is_observed()).count()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    /// Replace the cached mesh and clear the dirty flag.
    pub fn set_mesh(&mut self, mesh: Arc<Mesh>) {
        self.mesh = Some(mesh);
        self.dirty = false;
    }
}
