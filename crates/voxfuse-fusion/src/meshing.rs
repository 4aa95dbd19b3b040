//! Marching cubes over the chunk store.
//!
//! Cells have voxel centres as corners. A chunk owns the cells whose lower
//! corner lies inside it; corners on the upper faces come from the `+x`,
//! `+y`, `+z` (and diagonal) neighbours. A cell with a corner that is
//! unobserved, or that lives in a missing neighbour, emits nothing.
//!
//! Vertices are not shared between triangles; each carries its face
//! normal, oriented towards increasing distance (free space).

use rayon::prelude::*;
use tracing::debug;
use voxfuse_types::{Rgb, Vec3};

use crate::chunk::{Chunk, ChunkGeometry, ChunkId};
use crate::mesh::Mesh;
use crate::store::ChunkStore;
use crate::tables::{CORNER_OFFSETS, EDGE_CORNERS, TRIANGLES};
use crate::voxel::Voxel;

/// A chunk and its seven upper neighbours, indexed `dx + 2·dy + 4·dz`.
struct Neighbourhood<'a> {
    chunks: [Option<&'a Chunk>; 8],
    dims: [usize; 3],
}

impl<'a> Neighbourhood<'a> {
    fn new(store: &'a ChunkStore, id: ChunkId) -> Self {
        let mut chunks = [None; 8];
        for (n, slot) in chunks.iter_mut().enumerate() {
            let (dx, dy, dz) = ((n & 1) as i32, ((n >> 1) & 1) as i32, ((n >> 2) & 1) as i32);
            *slot = store.get(id.offset(dx, dy, dz));
        }
        Self {
            chunks,
            dims: store.geometry().dims,
        }
    }

    /// Voxel at local index `(i, j, k)` where each index may equal the
    /// chunk dimension. `None` when the owning chunk is missing.
    fn voxel(&self, i: usize, j: usize, k: usize) -> Option<&'a Voxel> {
        let split = |v: usize, dim: usize| if v >= dim { (1, v - dim) } else { (0, v) };
        let (dx, li) = split(i, self.dims[0]);
        let (dy, lj) = split(j, self.dims[1]);
        let (dz, lk) = split(k, self.dims[2]);
        self.chunks[dx + 2 * dy + 4 * dz].map(|c| c.voxel(li, lj, lk))
    }
}

/// Surface mesh of chunk `id`; empty when the chunk does not exist.
pub fn extract_chunk_mesh(store: &ChunkStore, id: ChunkId) -> Mesh {
    march(store, id).0
}

/// Meshes for `ids`, computed in parallel over a shared read-only store.
pub fn extract_meshes(store: &ChunkStore, ids: &[ChunkId]) -> Vec<(ChunkId, Mesh)> {
    let results: Vec<(ChunkId, Mesh, usize)> = ids
        .par_iter()
        .map(|&id| {
            let (mesh, incomplete) = march(store, id);
            (id, mesh, incomplete)
        })
        .collect();

    let incomplete: usize = results.iter().map(|r| r.2).sum();
    if incomplete > 0 {
        debug!(
            chunks = ids.len(),
            incomplete_cells = incomplete,
            "boundary cells skipped for missing neighbours"
        );
    }
    results.into_iter().map(|(id, mesh, _)| (id, mesh)).collect()
}

/// Returns the mesh and the number of cells skipped for a missing
/// neighbour chunk.
fn march(store: &ChunkStore, id: ChunkId) -> (Mesh, usize) {
    if !store.contains(id) {
        return (Mesh::default(), 0);
    }
    let geometry = *store.geometry();
    let hood = Neighbourhood::new(store, id);
    let [cx, cy, cz] = geometry.dims;

    let mut builder = MeshBuilder::default();
    let mut incomplete = 0;
    let mut corners = [Voxel::UNOBSERVED; 8];

    for k in 0..cz {
        for j in 0..cy {
            'cell: for i in 0..cx {
                for (c, [di, dj, dk]) in CORNER_OFFSETS.iter().enumerate() {
                    match hood.voxel(i + di, j + dj, k + dk) {
                        Some(v) if v.is_observed() => corners[c] = *v,
                        Some(_) => continue 'cell,
                        None => {
                            incomplete += 1;
                            continue 'cell;
                        }
                    }
                }
                polygonise(&geometry, id, [i, j, k], &corners, &mut builder);
            }
        }
    }
    (builder.finish(), incomplete)
}

fn polygonise(
    geometry: &ChunkGeometry,
    id: ChunkId,
    [i, j, k]: [usize; 3],
    corners: &[Voxel; 8],
    builder: &mut MeshBuilder,
) {
    let case = corners
        .iter()
        .enumerate()
        .filter(|(_, v)| v.distance < 0.0)
        .fold(0usize, |acc, (c, _)| acc | (1 << c));
    if case == 0 || case == 255 {
        return;
    }

    let positions: [Vec3; 8] = std::array::from_fn(|c| {
        let [di, dj, dk] = CORNER_OFFSETS[c];
        geometry.voxel_center(id, i + di, j + dj, k + dk)
    });

    // Distance gradient across the cell; points into free space.
    let mut gradient = Vec3::zero();
    for (c, [di, dj, dk]) in CORNER_OFFSETS.iter().enumerate() {
        let sign = |o: usize| if o == 1 { 1.0 } else { -1.0 };
        let d = corners[c].distance;
        gradient += Vec3::new(sign(*di) * d, sign(*dj) * d, sign(*dk) * d);
    }

    let edge_vertex = |e: usize| -> (Vec3, Option<Rgb>) {
        let [a, b] = EDGE_CORNERS[e];
        let (va, vb) = (&corners[a], &corners[b]);
        let denom = va.distance - vb.distance;
        let t = if denom.abs() < f32::EPSILON {
            0.5
        } else {
            (va.distance / denom).clamp(0.0, 1.0)
        };
        let color = match (va.color, vb.color) {
            (Some(ca), Some(cb)) => Some(ca.lerp(cb, t)),
            _ => None,
        };
        (positions[a].lerp(positions[b], t), color)
    };

    for tri in TRIANGLES[case].chunks_exact(3).take_while(|t| t[0] >= 0) {
        let a = edge_vertex(tri[0] as usize);
        let mut b = edge_vertex(tri[1] as usize);
        let mut c = edge_vertex(tri[2] as usize);
        let mut normal = (b.0 - a.0).cross(c.0 - a.0);
        if normal.dot(gradient) < 0.0 {
            std::mem::swap(&mut b, &mut c);
            normal = -normal;
        }
        let mut normal = normal.normalize_or_zero();
        if normal == Vec3::zero() {
            normal = gradient.normalize_or_zero();
        }
        builder.push_triangle([a, b, c], normal);
    }
}

#[derive(Default)]
struct MeshBuilder {
    mesh: Mesh,
    colors: Vec<Option<Rgb>>,
}

impl MeshBuilder {
    fn push_triangle(&mut self, vertices: [(Vec3, Option<Rgb>); 3], normal: Vec3) {
        for (p, color) in vertices {
            self.mesh.indices.push(self.mesh.positions.len() as u32);
            self.mesh.positions.push(p);
            self.mesh.normals.push(normal);
            self.colors.push(color);
        }
    }

    /// Colours are kept only when every vertex has one.
    fn finish(mut self) -> Mesh {
        if !self.colors.is_empty() && self.colors.iter().all(Option::is_some) {
            self.mesh.colors = self.colors.into_iter().flatten().collect();
        }
        self.mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RES: f32 = 0.1;
    const PLANE_Z: f32 = 0.43;

    fn store() -> ChunkStore {
        ChunkStore::new(ChunkGeometry::new([8, 8, 8], RES))
    }

    /// Fill chunk `id` with the signed distance to the plane `z = PLANE_Z`.
    fn fill_plane(store: &mut ChunkStore, id: ChunkId, color: Option<Rgb>) {
        let geometry = *store.geometry();
        let chunk = store.get_or_create(id);
        for idx in 0..geometry.voxel_count() {
            let [i, j, k] = geometry.coords(idx);
            let centre = geometry.voxel_center(id, i, j, k);
            chunk.voxels_mut()[idx] = Voxel {
                distance: centre.z - PLANE_Z,
                weight: 1.0,
                color,
            };
        }
    }

    #[test]
    fn missing_chunk_yields_empty_mesh() {
        assert!(extract_chunk_mesh(&store(), ChunkId::default()).is_empty());
    }

    #[test]
    fn plane_vertices_lie_on_the_plane() {
        let mut s = store();
        fill_plane(&mut s, ChunkId::default(), None);
        let mesh = extract_chunk_mesh(&s, ChunkId::default());
        assert!(!mesh.is_empty());
        for p in &mesh.positions {
            assert!((p.z - PLANE_Z).abs() < 1e-4, "z = {}", p.z);
        }
    }

    #[test]
    fn normals_point_into_free_space() {
        let mut s = store();
        fill_plane(&mut s, ChunkId::default(), None);
        let mesh = extract_chunk_mesh(&s, ChunkId::default());
        assert!(mesh.normals.iter().all(|n| n.z > 0.99));
        for [a, b, c] in mesh.triangles() {
            assert!((b - a).cross(c - a).z > 0.0);
        }
    }

    #[test]
    fn without_neighbours_vertices_stay_inside_voxel_centre_span() {
        let mut s = store();
        fill_plane(&mut s, ChunkId::default(), None);
        let mesh = extract_chunk_mesh(&s, ChunkId::default());
        let lo = 0.5 * RES;
        let hi = 7.5 * RES;
        for p in &mesh.positions {
            for v in [p.x, p.y] {
                assert!(v >= lo - 1e-5 && v <= hi + 1e-5, "{v} outside [{lo}, {hi}]");
            }
        }
    }

    #[test]
    fn neighbour_closes_the_seam() {
        let mut s = store();
        fill_plane(&mut s, ChunkId::default(), None);
        let alone = extract_chunk_mesh(&s, ChunkId::default());
        fill_plane(&mut s, ChunkId::new(1, 0, 0), None);
        let joined = extract_chunk_mesh(&s, ChunkId::default());
        assert!(joined.triangle_count() > alone.triangle_count());
        assert!(joined.positions.iter().any(|p| p.x > 7.5 * RES));
    }

    #[test]
    fn unobserved_corner_suppresses_cells() {
        let mut s = store();
        fill_plane(&mut s, ChunkId::default(), None);
        let full = extract_chunk_mesh(&s, ChunkId::default());
        // Voxel just below the plane.
        s.get_mut(ChunkId::default()).unwrap().voxel_mut(3, 3, 3).weight = 0.0;
        let holed = extract_chunk_mesh(&s, ChunkId::default());
        assert!(holed.triangle_count() < full.triangle_count());
    }

    #[test]
    fn colors_are_carried_when_present() {
        let mut s = store();
        fill_plane(&mut s, ChunkId::default(), Some(Rgb::new(40, 50, 60)));
        let mesh = extract_chunk_mesh(&s, ChunkId::default());
        assert!(mesh.has_colors());
        assert!(mesh.colors.iter().all(|c| *c == Rgb::new(40, 50, 60)));
    }

    #[test]
    fn parallel_extraction_matches_serial() {
        let mut s = store();
        let ids = [ChunkId::default(), ChunkId::new(1, 0, 0), ChunkId::new(0, 1, 0)];
        for id in ids {
            fill_plane(&mut s, id, None);
        }
        let parallel = extract_meshes(&s, &ids);
        assert_eq!(parallel.len(), 3);
        for (id, mesh) in parallel {
            assert_eq!(mesh, extract_chunk_mesh(&s, id));
        }
    }
}
