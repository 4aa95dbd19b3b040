//! Projective depth-frame integration.
//!
//! For every voxel of every chunk that intersects the sensor frustum:
//!
//! ```text
//! p   = world_to_camera(voxel centre)          // depth of the voxel = p.z
//! d   = depth[pixel(p)]                         // skipped if invalid
//! sd  = d - p.z                                 // > 0: voxel in free space
//! τ   = truncator(d)
//!
//! |sd| ≤ τ                      → running-average update
//! sd > τ + carving, observed    → reset to unobserved
//! otherwise                     → untouched
//! ```
//!
//! Existing chunks are updated in place through disjoint `&mut` borrows of
//! the arena. Candidates that do not exist yet are built as scratch chunks
//! in parallel and inserted afterwards only when they received a write.

use rayon::prelude::*;
use voxfuse_camera::{CameraModel, ColorImage, DepthImage, Frustum, PixelMask};
use voxfuse_types::{RigidMotion, Transform3D};

use crate::chunk::{Chunk, ChunkGeometry, ChunkId};
use crate::config::{FusionConfig, Truncator};
use crate::report::{ChunkStats, IntegrationReport};
use crate::store::ChunkStore;

/// Parameters of the projective update, taken from [`FusionConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    pub truncator: Truncator,
    pub max_weight: f32,
    pub increment_weight: f32,
    /// Carving margin; `None` disables carving.
    pub carving: Option<f32>,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl ProjectionParams {
    pub fn from_config(cfg: &FusionConfig) -> Self {
        Self {
            truncator: cfg.truncator,
            max_weight: cfg.max_weight,
            increment_weight: cfg.increment_weight,
            carving: cfg.carving(),
            near_plane: cfg.near_plane,
            far_plane: cfg.far_plane,
        }
    }
}

/// Ids of chunks whose boxes intersect `frustum`, sorted.
pub fn candidate_chunks(frustum: &Frustum, geometry: &ChunkGeometry) -> Vec<ChunkId> {
    let bb = frustum.bounding_box();
    let (Some(lo), Some(hi)) = (geometry.chunk_id_at(bb.min), geometry.chunk_id_at(bb.max)) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for x in lo.x..=hi.x {
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                let id = ChunkId::new(x, y, z);
                if frustum.intersects_aabb(&geometry.bounds(id)) {
                    out.push(id);
                }
            }
        }
    }
    out
}

/// Everything a worker needs to update one chunk against one frame.
struct Frame<'a, C: ?Sized> {
    camera: &'a C,
    world_to_camera: RigidMotion,
    depth: &'a DepthImage,
    color: Option<&'a ColorImage>,
    mask: Option<&'a PixelMask>,
    params: &'a ProjectionParams,
}

/// Fuse one depth frame into `store`.
///
/// `pose` maps the sensor frame to the world. A colour image whose size
/// differs from the depth image is ignored. Pixels that `mask` marks invalid
/// are treated as missing readings. Returns an empty report when the frustum
/// cannot be built.
pub fn integrate_depth<C: CameraModel + ?Sized>(
    store: &mut ChunkStore,
    camera: &C,
    depth: &DepthImage,
    color: Option<&ColorImage>,
    mask: Option<&PixelMask>,
    pose: &Transform3D,
    params: &ProjectionParams,
) -> IntegrationReport {
    let Some(frustum) = camera.compute_frustum(pose, params.near_plane, params.far_plane) else {
        return IntegrationReport::default();
    };
    let geometry = *store.geometry();
    let candidates = candidate_chunks(&frustum, &geometry);

    let frame = Frame {
        camera,
        world_to_camera: pose.inverse().to_rigid(),
        depth,
        color: color.filter(|c| c.width() == depth.width() && c.height() == depth.height()),
        mask,
        params,
    };

    let mut in_frustum = vec![false; store.len()];
    let mut missing = Vec::new();
    for &id in &candidates {
        match store.handle(id) {
            Some(h) => in_frustum[h.index()] = true,
            None => missing.push(id),
        }
    }

    let updated: Vec<(ChunkId, ChunkStats)> = store
        .chunks_mut()
        .par_iter_mut()
        .zip(in_frustum.par_iter())
        .filter(|(_, selected)| **selected)
        .map(|(chunk, _)| (chunk.id(), update_chunk(chunk, &frame)))
        .filter(|(_, stats)| stats.writes() > 0)
        .collect();

    let created: Vec<(Chunk, ChunkStats)> = missing
        .par_iter()
        .filter_map(|&id| {
            let mut chunk = Chunk::new(id, geometry);
            let stats = update_chunk(&mut chunk, &frame);
            (stats.writes() > 0).then_some((chunk, stats))
        })
        .collect();

    let mut report = IntegrationReport {
        candidate_chunks: candidates.len(),
        ..IntegrationReport::default()
    };
    let mut touched = Vec::with_capacity(updated.len() + created.len());
    for (id, stats) in updated {
        report.record(stats);
        touched.push(id);
    }
    for (chunk, stats) in created {
        report.record(stats);
        report.chunks_created += 1;
        touched.push(chunk.id());
        store.insert(chunk);
    }
    for &id in &touched {
        store.mark_dirty_with_neighbours(id);
    }
    store.set_latest(touched);
    report
}

fn update_chunk<C: CameraModel + ?Sized>(chunk: &mut Chunk, frame: &Frame<'_, C>) -> ChunkStats {
    let geometry = *chunk.geometry();
    let id = chunk.id();
    let params = frame.params;
    let (width, height) = (frame.depth.width(), frame.depth.height());
    let mut stats = ChunkStats::default();

    for (idx, voxel) in chunk.voxels_mut().iter_mut().enumerate() {
        let [i, j, k] = geometry.coords(idx);
        let p = frame
            .world_to_camera
            .apply(geometry.voxel_center(id, i, j, k));
        if p.z <= 0.0 {
            continue;
        }
        let Some((col, row)) = frame
            .camera
            .project_point(p)
            .and_then(|px| px.to_index(width, height))
        else {
            continue;
        };
        if frame.mask.is_some_and(|m| !m.is_valid(col, row)) {
            continue;
        }
        let measured = frame.depth.at(col, row);
        if !measured.is_finite() || measured < params.near_plane || measured > params.far_plane {
            continue;
        }

        let sd = measured - p.z;
        let truncation = params.truncator.distance(measured, geometry.resolution);
        if sd.abs() <= truncation {
            let color = frame.color.map(|c| c.at(col, row));
            voxel.integrate(
                sd,
                truncation,
                params.increment_weight,
                params.max_weight,
                color,
            );
            stats.updated += 1;
        } else if let Some(margin) = params.carving
            && sd > truncation + margin
            && voxel.is_observed()
        {
            voxel.carve();
            stats.carved += 1;
        }
    }

    if stats.writes() > 0 {
        chunk.mark_dirty();
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxfuse_camera::{Intrinsics, PinholeCamera};
    use voxfuse_types::{Rgb, Vec3};

    fn params() -> ProjectionParams {
        ProjectionParams {
            truncator: Truncator::Constant { distance: 0.1 },
            max_weight: 50.0,
            increment_weight: 1.0,
            carving: Some(0.05),
            near_plane: 0.1,
            far_plane: 3.0,
        }
    }

    fn camera() -> PinholeCamera {
        PinholeCamera::new(Intrinsics::centred(100.0, 64, 48))
    }

    fn store() -> ChunkStore {
        ChunkStore::new(ChunkGeometry::new([16, 16, 16], 0.05))
    }

    #[test]
    fn candidates_exclude_chunks_behind_camera() {
        let cam = camera();
        let f = cam
            .compute_frustum(&Transform3D::identity(), 0.1, 3.0)
            .unwrap();
        let ids = candidate_chunks(&f, &ChunkGeometry::new([16, 16, 16], 0.05));
        assert!(!ids.is_empty());
        assert!(ids.iter().all(|id| id.z >= 0));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn plane_frame_updates_band_around_surface() {
        let mut s = store();
        let depth = DepthImage::filled(64, 48, 1.0);
        let report = integrate_depth(
            &mut s,
            &camera(),
            &depth,
            None,
            None,
            &Transform3D::identity(),
            &params(),
        );
        assert!(report.chunks_touched > 0);
        assert_eq!(report.chunks_created, report.chunks_touched);
        assert_eq!(report.voxels_carved, 0);

        // In front of the surface, inside the band.
        let v = s.voxel_at(Vec3::new(0.025, 0.025, 0.975)).unwrap();
        assert!(v.is_observed());
        assert!((v.distance - 0.025).abs() < 1e-4);
        // Behind the surface, inside the band.
        let v = s.voxel_at(Vec3::new(0.025, 0.025, 1.025)).unwrap();
        assert!((v.distance + 0.025).abs() < 1e-4);
        // Far in front: never written.
        let v = s.voxel_at(Vec3::new(0.025, 0.025, 0.825)).unwrap();
        assert!(!v.is_observed());
    }

    #[test]
    fn only_written_chunks_are_created_and_latest() {
        let mut s = store();
        let depth = DepthImage::filled(64, 48, 1.0);
        let report = integrate_depth(
            &mut s,
            &camera(),
            &depth,
            None,
            None,
            &Transform3D::identity(),
            &params(),
        );
        assert_eq!(s.len(), report.chunks_touched);
        assert!(report.candidate_chunks > s.len());
        assert_eq!(s.latest_ids().len(), s.len());
        assert!(s.chunks().iter().all(|c| c.is_dirty() && c.observed_count() > 0));
    }

    #[test]
    fn invalid_samples_are_skipped() {
        let mut s = store();
        let mut depth = DepthImage::filled(64, 48, 0.0);
        depth.set(10, 10, f32::NAN);
        depth.set(11, 10, 10.0); // beyond far plane
        let report = integrate_depth(
            &mut s,
            &camera(),
            &depth,
            None,
            None,
            &Transform3D::identity(),
            &params(),
        );
        assert_eq!(report.chunks_touched, 0);
        assert!(s.is_empty());
    }

    #[test]
    fn carving_clears_voxels_in_front_of_new_surface() {
        let mut s = store();
        let cam = camera();
        let pose = Transform3D::identity();
        let stale = Vec3::new(0.025, 0.025, 0.975);

        integrate_depth(&mut s, &cam, &DepthImage::filled(64, 48, 1.0), None, None, &pose, &params());
        assert!(s.voxel_at(stale).unwrap().is_observed());

        let report = integrate_depth(&mut s, &cam, &DepthImage::filled(64, 48, 2.0), None, None, &pose, &params());
        assert!(report.voxels_carved > 0);
        assert!(!s.voxel_at(stale).unwrap().is_observed());
    }

    #[test]
    fn carving_disabled_keeps_voxels() {
        let mut s = store();
        let cam = camera();
        let pose = Transform3D::identity();
        let stale = Vec3::new(0.025, 0.025, 0.975);
        let p = ProjectionParams {
            carving: None,
            ..params()
        };

        integrate_depth(&mut s, &cam, &DepthImage::filled(64, 48, 1.0), None, None, &pose, &p);
        integrate_depth(&mut s, &cam, &DepthImage::filled(64, 48, 2.0), None, None, &pose, &p);
        assert!(s.voxel_at(stale).unwrap().is_observed());
    }

    #[test]
    fn masked_pixels_are_treated_as_missing() {
        let mut s = store();
        let depth = DepthImage::filled(64, 48, 1.0);
        // Left half of the image (world x < 0) is masked out.
        let mut mask = PixelMask::all_valid(64, 48);
        for row in 0..48 {
            for col in 0..32 {
                mask.set(col, row, false);
            }
        }
        integrate_depth(
            &mut s,
            &camera(),
            &depth,
            None,
            Some(&mask),
            &Transform3D::identity(),
            &params(),
        );
        assert!(s
            .voxel_at(Vec3::new(-0.125, 0.025, 0.975))
            .is_none_or(|v| !v.is_observed()));
        assert!(s.voxel_at(Vec3::new(0.125, 0.025, 0.975)).unwrap().is_observed());
        assert!(s.chunks().iter().all(|c| c.id().x >= 0));
    }

    #[test]
    fn color_is_sampled_from_aligned_image() {
        let mut s = store();
        let depth = DepthImage::filled(64, 48, 1.0);
        let color = ColorImage::filled(64, 48, Rgb::new(10, 200, 30));
        integrate_depth(
            &mut s,
            &camera(),
            &depth,
            Some(&color),
            None,
            &Transform3D::identity(),
            &params(),
        );
        let v = s.voxel_at(Vec3::new(0.025, 0.025, 0.975)).unwrap();
        assert_eq!(v.color, Some(Rgb::new(10, 200, 30)));
    }

    #[test]
    fn touched_chunks_dirty_existing_lower_neighbours() {
        let mut s = store();
        // A chunk well below the frustum that a frame can never reach.
        let far_below = ChunkId::new(-1, -1, -2);
        s.get_or_create(far_below);
        // Left of the view, but the -x neighbour of a chunk the surface crosses.
        let surface = s.chunk_id_at(Vec3::new(-0.3, 0.0, 1.0)).unwrap();
        let lower = surface.offset(-1, 0, 0);
        s.get_or_create(lower);

        let depth = DepthImage::filled(64, 48, 1.0);
        integrate_depth(
            &mut s,
            &camera(),
            &depth,
            None,
            None,
            &Transform3D::identity(),
            &params(),
        );
        assert!(s.get(lower).unwrap().is_dirty());
        assert_eq!(s.get(lower).unwrap().observed_count(), 0);
        assert!(!s.latest_ids().contains(&lower));
        assert!(!s.get(far_below).unwrap().is_dirty());
    }
}
