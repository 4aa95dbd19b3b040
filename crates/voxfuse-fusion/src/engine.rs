//! [`FusionEngine`] – the synchronous surface a transport wrapper drives.
//!
//! The engine owns the configuration, the registered sensor models, the
//! chunk store and the worker pool. Frames are validated before the store
//! lock is taken; every integration, extraction and reset then holds the
//! write lock for its whole pass, so passes never interleave and frames are
//! applied in call order.
//!
//! ```rust
//! use voxfuse_camera::{DepthImage, Intrinsics, PinholeCamera};
//! use voxfuse_fusion::{FusionConfig, FusionEngine};
//! use voxfuse_types::Transform3D;
//!
//! let mut engine = FusionEngine::new(FusionConfig::default()).unwrap();
//! engine
//!     .register_sensor("front", PinholeCamera::new(Intrinsics::centred(60.0, 32, 24)).into())
//!     .unwrap();
//!
//! let depth = DepthImage::filled(32, 24, 1.0);
//! let report = engine
//!     .integrate_depth_frame("front", &depth, None, &Transform3D::identity())
//!     .unwrap();
//! assert!(report.chunks_touched > 0);
//! assert!(engine.meshes().values().any(|m| !m.is_empty()));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use voxfuse_camera::{CameraModel, ColorImage, DepthImage, Frustum, PixelMask, SensorModel};
use voxfuse_types::{Aabb, FusionError, Transform3D, Vec3};

use crate::chunk::{ChunkGeometry, ChunkId};
use crate::config::FusionConfig;
use crate::mesh::{self, Mesh, MeshExportReport};
use crate::meshing;
use crate::points::{self, PointCloud, PointParams};
use crate::projection::{self, ProjectionParams};
use crate::report::IntegrationReport;
use crate::scheduler::FusionScheduler;
use crate::store::ChunkStore;
use crate::voxel::Voxel;

/// Chunked TSDF fusion engine.
#[derive(Debug)]
pub struct FusionEngine {
    config: FusionConfig,
    sensors: HashMap<String, Sensor>,
    store: RwLock<ChunkStore>,
    scheduler: FusionScheduler,
}

/// A registered sensor stream: its calibration and optional pixel mask.
#[derive(Debug, Clone)]
struct Sensor {
    model: SensorModel,
    mask: Option<PixelMask>,
}

fn geometry_of(config: &FusionConfig) -> ChunkGeometry {
    ChunkGeometry::new(config.chunk_dims, config.resolution)
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Result<Self, FusionError> {
        config.validate()?;
        let scheduler = FusionScheduler::new(config.thread_count)?;
        info!(
            chunk_dims = ?config.chunk_dims,
            resolution = config.resolution,
            threads = scheduler.threads(),
            "fusion engine ready"
        );
        Ok(Self {
            store: RwLock::new(ChunkStore::new(geometry_of(&config))),
            sensors: HashMap::new(),
            scheduler,
            config,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    // ── Configuration ───────────────────────────────────────────────────────

    /// Register (or replace) the calibration used for frames from `id`.
    pub fn register_sensor(
        &mut self,
        id: impl Into<String>,
        model: SensorModel,
    ) -> Result<(), FusionError> {
        self.insert_sensor(id.into(), model, None)
    }

    /// Register a sensor whose masked pixels never contribute a reading.
    /// The mask must match the calibrated image size.
    pub fn register_sensor_with_mask(
        &mut self,
        id: impl Into<String>,
        model: SensorModel,
        mask: PixelMask,
    ) -> Result<(), FusionError> {
        self.insert_sensor(id.into(), model, Some(mask))
    }

    fn insert_sensor(
        &mut self,
        id: String,
        model: SensorModel,
        mask: Option<PixelMask>,
    ) -> Result<(), FusionError> {
        let k = model.intrinsics();
        if !k.is_valid() {
            return Err(FusionError::InvalidConfig(format!(
                "sensor {id}: intrinsics are not usable"
            )));
        }
        if let Some(m) = &mask
            && (m.width() != k.width || m.height() != k.height)
        {
            return Err(FusionError::InvalidConfig(format!(
                "sensor {id}: mask is {}x{}, calibration is {}x{}",
                m.width(),
                m.height(),
                k.width,
                k.height
            )));
        }
        info!(
            sensor = %id,
            masked_pixels = mask.as_ref().map_or(0, |m| {
                (m.width() as usize * m.height() as usize) - m.valid_count()
            }),
            "sensor registered"
        );
        self.sensors.insert(id, Sensor { model, mask });
        Ok(())
    }

    pub fn sensor(&self, id: &str) -> Option<&SensorModel> {
        self.sensors.get(id).map(|s| &s.model)
    }

    pub fn sensor_mask(&self, id: &str) -> Option<&PixelMask> {
        self.sensors.get(id).and_then(|s| s.mask.as_ref())
    }

    /// Replace the configuration. The volume is discarded and the worker
    /// pool rebuilt; registered sensors are kept. On error nothing changes.
    #[instrument(skip_all)]
    pub fn configure(&mut self, config: FusionConfig) -> Result<(), FusionError> {
        config.validate()?;
        let scheduler = FusionScheduler::new(config.thread_count)?;
        self.store = RwLock::new(ChunkStore::new(geometry_of(&config)));
        self.scheduler = scheduler;
        info!(
            chunk_dims = ?config.chunk_dims,
            resolution = config.resolution,
            threads = self.scheduler.threads(),
            "fusion engine reconfigured"
        );
        self.config = config;
        Ok(())
    }

    // ── Integration ─────────────────────────────────────────────────────────

    /// Fuse one depth frame (and optional aligned colour frame) taken by
    /// sensor `sensor_id` at `pose` (sensor → world).
    #[instrument(skip_all, fields(sensor = sensor_id))]
    pub fn integrate_depth_frame(
        &self,
        sensor_id: &str,
        depth: &DepthImage,
        color: Option<&ColorImage>,
        pose: &Transform3D,
    ) -> Result<IntegrationReport, FusionError> {
        let sensor = self.sensors.get(sensor_id).ok_or_else(|| {
            warn!("frame rejected: unknown sensor");
            FusionError::UnknownSensor(sensor_id.to_string())
        })?;
        let camera = &sensor.model;
        let k = camera.intrinsics();
        if depth.width() != k.width || depth.height() != k.height {
            warn!(
                width = depth.width(),
                height = depth.height(),
                "frame rejected: depth size does not match calibration"
            );
            return Err(FusionError::InvalidFrame {
                expected_width: k.width,
                expected_height: k.height,
                width: depth.width(),
                height: depth.height(),
            });
        }
        if let Some(c) = color
            && (c.width() != depth.width() || c.height() != depth.height())
        {
            warn!(
                width = c.width(),
                height = c.height(),
                "frame rejected: colour size does not match depth"
            );
            return Err(FusionError::InvalidFrame {
                expected_width: depth.width(),
                expected_height: depth.height(),
                width: c.width(),
                height: c.height(),
            });
        }
        let pose = &check_pose(pose)?;

        let params = ProjectionParams::from_config(&self.config);
        let started = Instant::now();
        let mut guard = self.write_store();
        let store: &mut ChunkStore = &mut guard;
        let mut report = self.scheduler.install(|| {
            projection::integrate_depth(
                store,
                camera,
                depth,
                color,
                sensor.mask.as_ref(),
                pose,
                &params,
            )
        });
        if self.config.mesh_after_integration {
            report.meshes_updated = self.refresh_dirty(store).len();
        }
        drop(guard);

        debug!(
            candidate_chunks = report.candidate_chunks,
            chunks_touched = report.chunks_touched,
            chunks_created = report.chunks_created,
            voxels_updated = report.voxels_updated,
            voxels_carved = report.voxels_carved,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "depth frame integrated"
        );
        Ok(report)
    }

    /// Fuse a world-frame point cloud observed from `pose`.
    #[instrument(skip_all, fields(points = cloud.len()))]
    pub fn integrate_point_cloud(
        &self,
        cloud: &PointCloud,
        pose: &Transform3D,
    ) -> Result<IntegrationReport, FusionError> {
        let pose = &check_pose(pose)?;

        let params = PointParams::from_config(&self.config);
        let started = Instant::now();
        let mut guard = self.write_store();
        let store: &mut ChunkStore = &mut guard;
        let mut report = self
            .scheduler
            .install(|| points::integrate_points(store, cloud, pose, &params));
        if self.config.mesh_after_integration {
            report.meshes_updated = self.refresh_dirty(store).len();
        }
        drop(guard);

        debug!(
            chunks_touched = report.chunks_touched,
            voxels_updated = report.voxels_updated,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "point cloud integrated"
        );
        Ok(report)
    }

    // ── Extraction ──────────────────────────────────────────────────────────

    /// Re-mesh dirty chunks and return only those meshes.
    #[instrument(skip_all)]
    pub fn extract_dirty_meshes(&self) -> BTreeMap<ChunkId, Arc<Mesh>> {
        let mut store = self.write_store();
        self.refresh_dirty(&mut store)
    }

    /// Re-mesh every allocated chunk.
    #[instrument(skip_all)]
    pub fn extract_all_meshes(&self) -> BTreeMap<ChunkId, Arc<Mesh>> {
        let mut store = self.write_store();
        let ids: Vec<ChunkId> = store.ids().into_iter().collect();
        self.remesh(&mut store, ids)
    }

    /// Every cached mesh after refreshing dirty chunks. Chunks that did not
    /// change since the last call return the same `Arc`.
    pub fn meshes(&self) -> BTreeMap<ChunkId, Arc<Mesh>> {
        let mut store = self.write_store();
        self.refresh_dirty(&mut store);
        store
            .chunks()
            .iter()
            .filter_map(|c| c.mesh().map(|m| (c.id(), Arc::clone(m))))
            .collect()
    }

    fn refresh_dirty(&self, store: &mut ChunkStore) -> BTreeMap<ChunkId, Arc<Mesh>> {
        let ids: Vec<ChunkId> = store.dirty_ids().into_iter().collect();
        self.remesh(store, ids)
    }

    /// Mesh `ids` in parallel against a shared view of the store, then swap
    /// the results in.
    fn remesh(&self, store: &mut ChunkStore, ids: Vec<ChunkId>) -> BTreeMap<ChunkId, Arc<Mesh>> {
        if ids.is_empty() {
            return BTreeMap::new();
        }
        let started = Instant::now();
        let shared: &ChunkStore = store;
        let meshes = self
            .scheduler
            .install(|| meshing::extract_meshes(shared, &ids));

        let mut out = BTreeMap::new();
        let mut triangles = 0;
        for (id, mesh) in meshes {
            triangles += mesh.triangle_count();
            let mesh = Arc::new(mesh);
            if let Some(chunk) = store.get_mut(id) {
                chunk.set_mesh(Arc::clone(&mesh));
            }
            out.insert(id, mesh);
        }
        debug!(
            chunks = out.len(),
            triangles,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "meshes refreshed"
        );
        out
    }

    /// Write the aggregate mesh as ASCII PLY.
    #[instrument(skip_all)]
    pub fn export_mesh(&self, path: impl AsRef<Path>) -> Result<MeshExportReport, FusionError> {
        let path = path.as_ref();
        let export_err = |e: std::io::Error| FusionError::Export(format!("{}: {e}", path.display()));

        let meshes = self.meshes();
        let file = File::create(path).map_err(export_err)?;
        let mut out = BufWriter::new(file);
        let (vertices, triangles) =
            mesh::write_ply(meshes.values().map(|m| &**m), &mut out).map_err(export_err)?;
        out.flush().map_err(export_err)?;

        let chunks = meshes.values().filter(|m| !m.is_empty()).count();
        info!(
            path = %path.display(),
            chunks,
            vertices,
            triangles,
            "mesh exported"
        );
        Ok(MeshExportReport {
            path: path.to_path_buf(),
            chunks,
            vertices,
            triangles,
        })
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Boxes of every allocated chunk, sorted by chunk id.
    pub fn allocated_chunk_bounds(&self) -> Vec<Aabb> {
        let store = self.read_store();
        store.ids().into_iter().map(|id| store.bounds(id)).collect()
    }

    /// Boxes of the chunks touched by the most recent integration.
    pub fn latest_chunk_bounds(&self) -> Vec<Aabb> {
        let store = self.read_store();
        store.latest_ids().iter().map(|&id| store.bounds(id)).collect()
    }

    /// Viewing volume of `sensor_id` at `pose`, clipped to the configured
    /// near and far planes.
    pub fn frustum(&self, sensor_id: &str, pose: &Transform3D) -> Result<Frustum, FusionError> {
        let camera = self
            .sensor(sensor_id)
            .ok_or_else(|| FusionError::UnknownSensor(sensor_id.to_string()))?;
        let pose = check_pose(pose)?;
        camera
            .compute_frustum(&pose, self.config.near_plane, self.config.far_plane)
            .ok_or_else(|| FusionError::InvalidPose("frustum is degenerate".to_string()))
    }

    pub fn chunk_count(&self) -> usize {
        self.read_store().len()
    }

    pub fn observed_voxel_count(&self) -> usize {
        self.read_store().observed_voxels()
    }

    /// Copy of the voxel containing `p`, if its chunk is allocated.
    pub fn voxel_at(&self, p: Vec3) -> Option<Voxel> {
        self.read_store().voxel_at(p).copied()
    }

    /// Copy of every chunk's voxels keyed by chunk id.
    pub fn snapshot(&self) -> BTreeMap<ChunkId, Vec<Voxel>> {
        self.read_store()
            .chunks()
            .iter()
            .map(|c| (c.id(), c.voxels().to_vec()))
            .collect()
    }

    /// Drop every chunk. Waits for any in-flight pass to finish.
    #[instrument(skip_all)]
    pub fn reset(&self) {
        let mut store = self.write_store();
        let chunks = store.len();
        store.clear();
        info!(chunks, "volume reset");
    }

    // ── Locking ─────────────────────────────────────────────────────────────

    fn write_store(&self) -> RwLockWriteGuard<'_, ChunkStore> {
        self.store.write().unwrap_or_else(|poisoned| {
            warn!("chunk store lock poisoned by a failed pass; recovering");
            poisoned.into_inner()
        })
    }

    fn read_store(&self) -> RwLockReadGuard<'_, ChunkStore> {
        self.store.read().unwrap_or_else(|poisoned| {
            warn!("chunk store lock poisoned by a failed pass; recovering");
            poisoned.into_inner()
        })
    }
}

/// Reject non-finite poses and return the pose with a unit rotation, so
/// culling and the per-voxel transform agree on the same rigid motion.
fn check_pose(pose: &Transform3D) -> Result<Transform3D, FusionError> {
    if pose.is_finite() {
        Ok(pose.normalized())
    } else {
        warn!("frame rejected: non-finite pose");
        Err(FusionError::InvalidPose(
            "pose contains non-finite values or a zero-norm rotation".to_string(),
        ))
    }
}
