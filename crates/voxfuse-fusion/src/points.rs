//! Point-cloud integration.
//!
//! Each finite point updates only the voxel that contains it, with the
//! signed distance measured along the ray from the sensor origin:
//! `sd = |p - origin| - |centre - origin|`. A point sitting exactly on a
//! voxel centre therefore stores distance `0`.

use std::collections::BTreeMap;

use rayon::prelude::*;
use voxfuse_types::{Rgb, Transform3D, Vec3};

use crate::chunk::ChunkId;
use crate::config::FusionConfig;
use crate::report::{ChunkStats, IntegrationReport};
use crate::store::ChunkStore;

// ────────────────────────────────────────────────────────────────────────────
// PointCloud
// ────────────────────────────────────────────────────────────────────────────

/// World-frame points with optional per-point colour.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    points: Vec<Vec3>,
    colors: Option<Vec<Rgb>>,
}

impl PointCloud {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self {
            points,
            colors: None,
        }
    }

    /// Returns `None` when the two buffers differ in length.
    pub fn with_colors(points: Vec<Vec3>, colors: Vec<Rgb>) -> Option<Self> {
        (points.len() == colors.len()).then_some(Self {
            points,
            colors: Some(colors),
        })
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn colors(&self) -> Option<&[Rgb]> {
        self.colors.as_deref()
    }

    pub fn color(&self, index: usize) -> Option<Rgb> {
        self.colors.as_ref().and_then(|c| c.get(index).copied())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Integration
// ────────────────────────────────────────────────────────────────────────────

/// Parameters of the point update, taken from [`FusionConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointParams {
    /// Fixed truncation band.
    pub truncation: f32,
    pub increment_weight: f32,
    pub max_weight: f32,
}

impl PointParams {
    pub fn from_config(cfg: &FusionConfig) -> Self {
        Self {
            truncation: cfg.point_band(),
            increment_weight: cfg.increment_weight,
            max_weight: cfg.max_weight,
        }
    }
}

/// One point routed to a voxel: flat voxel index and point index.
type Sample = (usize, usize);

/// Fuse `cloud` into `store`; `pose` gives the ray origin.
///
/// Points are grouped by chunk in input order, the chunks they land in are
/// created up front, and each group is then applied in parallel.
pub fn integrate_points(
    store: &mut ChunkStore,
    cloud: &PointCloud,
    pose: &Transform3D,
    params: &PointParams,
) -> IntegrationReport {
    let geometry = *store.geometry();
    let origin = pose.translation;

    let mut groups: BTreeMap<ChunkId, Vec<Sample>> = BTreeMap::new();
    for (n, &p) in cloud.points().iter().enumerate() {
        if let Some((id, [i, j, k])) = geometry.locate(p) {
            groups.entry(id).or_default().push((geometry.index(i, j, k), n));
        }
    }

    let mut report = IntegrationReport {
        candidate_chunks: groups.len(),
        ..IntegrationReport::default()
    };

    let mut work: Vec<Option<&[Sample]>> = vec![None; store.len()];
    for (&id, samples) in &groups {
        if !store.contains(id) {
            report.chunks_created += 1;
        }
        store.get_or_create(id);
        let handle = match store.handle(id) {
            Some(h) => h.index(),
            None => continue,
        };
        if handle >= work.len() {
            work.resize(handle + 1, None);
        }
        work[handle] = Some(samples.as_slice());
    }

    let touched: Vec<(ChunkId, ChunkStats)> = store
        .chunks_mut()
        .par_iter_mut()
        .zip(work.par_iter())
        .filter_map(|(chunk, samples)| samples.map(|s| (chunk, s)))
        .map(|(chunk, samples)| {
            let id = chunk.id();
            for &(idx, n) in samples {
                let [i, j, k] = geometry.coords(idx);
                let centre = geometry.voxel_center(id, i, j, k);
                let sd = (cloud.points()[n] - origin).length() - (centre - origin).length();
                chunk.voxels_mut()[idx].integrate(
                    sd,
                    params.truncation,
                    params.increment_weight,
                    params.max_weight,
                    cloud.color(n),
                );
            }
            chunk.mark_dirty();
            (
                id,
                ChunkStats {
                    updated: samples.len(),
                    carved: 0,
                },
            )
        })
        .collect();

    let mut ids = Vec::with_capacity(touched.len());
    for (id, stats) in touched {
        report.record(stats);
        ids.push(id);
    }
    for &id in &ids {
        store.mark_dirty_with_neighbours(id);
    }
    store.set_latest(ids);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkGeometry;

    fn params() -> PointParams {
        PointParams {
            truncation: 0.05,
            increment_weight: 1.0,
            max_weight: 10.0,
        }
    }

    fn store() -> ChunkStore {
        ChunkStore::new(ChunkGeometry::new([16, 16, 16], 0.05))
    }

    fn origin() -> Transform3D {
        Transform3D::from_translation(Vec3::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn single_point_touches_exactly_one_voxel() {
        let mut s = store();
        let cloud = PointCloud::new(vec![Vec3::new(0.025, 0.025, 0.025)]);
        let report = integrate_points(&mut s, &cloud, &origin(), &params());
        assert_eq!(report.voxels_updated, 1);
        assert_eq!(report.chunks_touched, 1);
        assert_eq!(s.observed_voxels(), 1);
        let v = s.voxel_at(Vec3::new(0.025, 0.025, 0.025)).unwrap();
        assert!(v.distance.abs() < 1e-6);
        assert_eq!(v.weight, 1.0);
    }

    #[test]
    fn off_centre_point_stores_ray_distance() {
        let mut s = store();
        // 1 cm beyond the centre of the voxel along the ray.
        let cloud = PointCloud::new(vec![Vec3::new(0.0, 0.0, 0.035)]);
        let o = Transform3D::from_translation(Vec3::new(0.025, 0.025, -1.0));
        integrate_points(&mut s, &cloud, &o, &params());
        let v = s.voxel_at(Vec3::new(0.025, 0.025, 0.025)).unwrap();
        let expected = Vec3::new(-0.025, -0.025, 1.035).length() - 1.025;
        assert!((v.distance - expected).abs() < 1e-5);
    }

    #[test]
    fn non_finite_points_are_skipped() {
        let mut s = store();
        let cloud = PointCloud::new(vec![
            Vec3::new(f32::NAN, 0.0, 0.0),
            Vec3::new(0.0, f32::INFINITY, 0.0),
        ]);
        let report = integrate_points(&mut s, &cloud, &origin(), &params());
        assert_eq!(report, IntegrationReport::default());
        assert!(s.is_empty());
    }

    #[test]
    fn colors_follow_points() {
        let mut s = store();
        let cloud = PointCloud::with_colors(
            vec![Vec3::new(0.1, 0.1, 0.1), Vec3::new(-0.5, 0.2, 0.9)],
            vec![Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)],
        )
        .unwrap();
        integrate_points(&mut s, &cloud, &origin(), &params());
        assert_eq!(
            s.voxel_at(Vec3::new(-0.5, 0.2, 0.9)).unwrap().color,
            Some(Rgb::new(0, 0, 255))
        );
        assert_eq!(s.len(), 2);
        assert_eq!(s.latest_ids().len(), 2);
    }

    #[test]
    fn mismatched_color_buffer_is_rejected() {
        assert!(PointCloud::with_colors(vec![Vec3::zero()], vec![]).is_none());
    }

    #[test]
    fn disjoint_clouds_commute() {
        let a = PointCloud::new(
            (0..40)
                .map(|n| Vec3::new(n as f32 * 0.07, 0.3, 0.2))
                .collect(),
        );
        let b = PointCloud::new(
            (0..40)
                .map(|n| Vec3::new(-0.4, n as f32 * 0.06 - 1.0, 1.3))
                .collect(),
        );

        let mut ab = store();
        integrate_points(&mut ab, &a, &origin(), &params());
        integrate_points(&mut ab, &b, &origin(), &params());
        let mut ba = store();
        integrate_points(&mut ba, &b, &origin(), &params());
        integrate_points(&mut ba, &a, &origin(), &params());

        assert_eq!(ab.ids(), ba.ids());
        for id in ab.ids() {
            assert_eq!(ab.get(id).unwrap().voxels(), ba.get(id).unwrap().voxels());
        }
    }

    #[test]
    fn repeated_points_average_into_one_voxel() {
        let mut s = store();
        let p = Vec3::new(0.2, 0.2, 0.2);
        let cloud = PointCloud::new(vec![p, p, p]);
        let report = integrate_points(&mut s, &cloud, &origin(), &params());
        assert_eq!(report.voxels_updated, 3);
        assert_eq!(s.observed_voxels(), 1);
        assert_eq!(s.voxel_at(p).unwrap().weight, 3.0);
    }
}
