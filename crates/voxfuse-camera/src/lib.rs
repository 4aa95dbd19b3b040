//! # voxfuse-camera
//!
//! Sensor models and sample buffers for depth fusion.
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`CameraModel`] | project / unproject / frustum capability set |
//! | [`PinholeCamera`] | pinhole + radial-tangential distortion |
//! | [`FisheyeCamera`] | equidistant fisheye |
//! | [`SensorModel`] | configuration-time choice between the two |
//! | [`DepthImage`] / [`ColorImage`] | row-major sample grids |
//! | [`PixelMask`] | per-sensor pixel validity |
//! | [`Frustum`] | six-plane viewing volume with box culling |
//!
//! ## Example
//!
//! ```rust
//! use voxfuse_camera::{CameraModel, Intrinsics, PinholeCamera, Pixel};
//! use voxfuse_types::Transform3D;
//!
//! let cam = PinholeCamera::new(Intrinsics::centred(500.0, 640, 480));
//! let pose = Transform3D::identity();
//! let p = cam.unproject(Pixel::new(100.0, 50.0), 2.0, &pose).unwrap();
//! let px = cam.project(p, &pose).unwrap();
//! assert!((px.u - 100.0).abs() < 1e-3);
//! ```

pub mod fisheye;
pub mod frustum;
pub mod image;
pub mod intrinsics;
pub mod model;
pub mod pinhole;

pub use fisheye::FisheyeCamera;
pub use frustum::{Frustum, Plane};
pub use image::{ColorImage, DepthImage, Pixel, PixelFormat, PixelMask};
pub use intrinsics::{EquidistantCoefficients, Intrinsics, RadialTangential};
pub use model::{CameraModel, SensorModel};
pub use pinhole::PinholeCamera;
