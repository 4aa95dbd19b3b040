//! # voxfuse-fusion
//!
//! Chunked truncated-signed-distance fusion: depth frames and point clouds
//! go in, per-chunk triangle meshes come out.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | [`FusionConfig`] and the [`Truncator`] band model |
//! | [`voxel`] | weighted running-average [`Voxel`] update |
//! | [`chunk`] | [`ChunkId`], grid arithmetic and the [`Chunk`] block |
//! | [`store`] | [`ChunkStore`]: lazily populated spatial hash of chunks |
//! | [`projection`] | frustum culling and projective depth integration |
//! | [`points`] | [`PointCloud`] integration along sensor rays |
//! | [`meshing`] | marching cubes across chunk boundaries |
//! | [`mesh`] | [`Mesh`] buffers and ASCII PLY export |
//! | [`scheduler`] | dedicated rayon pool for parallel passes |
//! | [`engine`] | [`FusionEngine`]: the thread-safe façade |
//!
//! ## Example
//!
//! ```rust
//! use voxfuse_fusion::{FusionEngine, FusionConfig, PointCloud};
//! use voxfuse_types::{Transform3D, Vec3};
//!
//! let engine = FusionEngine::new(FusionConfig::default()).unwrap();
//! let cloud = PointCloud::new(vec![Vec3::new(0.5, 0.0, 1.0), Vec3::new(0.5, 0.1, 1.0)]);
//! let report = engine
//!     .integrate_point_cloud(&cloud, &Transform3D::identity())
//!     .unwrap();
//! assert_eq!(report.voxels_updated, 2);
//! assert_eq!(engine.observed_voxel_count(), 2);
//! ```

pub mod chunk;
pub mod config;
pub mod engine;
pub mod mesh;
pub mod meshing;
pub mod points;
pub mod projection;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod tables;
pub mod voxel;

pub use chunk::{Chunk, ChunkGeometry, ChunkId};
pub use config::{FusionConfig, Truncator};
pub use engine::FusionEngine;
pub use mesh::{Mesh, MeshExportReport};
pub use points::PointCloud;
pub use report::IntegrationReport;
pub use store::ChunkStore;
pub use voxel::Voxel;
