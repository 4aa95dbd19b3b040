//! Fusion configuration and truncation policy.
//!
//! Every field carries a serde default so partial TOML documents load:
//!
//! ```rust
//! use voxfuse_fusion::config::FusionConfig;
//!
//! let cfg: FusionConfig = toml::from_str("resolution = 0.02\nuse_carving = false").unwrap();
//! assert_eq!(cfg.chunk_dims, [16, 16, 16]);
//! assert!(!cfg.use_carving);
//! assert!(cfg.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use voxfuse_types::FusionError;

// ────────────────────────────────────────────────────────────────────────────
// Truncator
// ────────────────────────────────────────────────────────────────────────────

/// Half-width of the band around the measured surface inside which voxels
/// are updated, as a function of the measured depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Truncator {
    /// The same band at every depth.
    Constant { distance: f32 },
    /// `scale * (constant + linear * d + quadratic * d²)`, matching the
    /// depth-dependent noise of structured-light sensors.
    Quadratic {
        constant: f32,
        linear: f32,
        quadratic: f32,
        scale: f32,
    },
}

impl Default for Truncator {
    fn default() -> Self {
        Truncator::Quadratic {
            constant: 0.001504,
            linear: 0.00152,
            quadratic: 0.0019,
            scale: 8.0,
        }
    }
}

impl Truncator {
    /// Band half-width for a sample at `depth`, never thinner than one
    /// voxel of size `resolution`.
    pub fn distance(&self, depth: f32, resolution: f32) -> f32 {
        let raw = match *self {
            Truncator::Constant { distance } => distance,
            Truncator::Quadratic {
                constant,
                linear,
                quadratic,
                scale,
            } => scale * (constant + linear * depth + quadratic * depth * depth),
        };
        raw.max(resolution)
    }

    fn validate(&self) -> Result<(), FusionError> {
        match *self {
            Truncator::Constant { distance } if !(distance.is_finite() && distance > 0.0) => Err(
                FusionError::InvalidConfig(format!("truncation distance must be > 0, got {distance}")),
            ),
            Truncator::Quadratic {
                constant,
                linear,
                quadratic,
                scale,
            } if ![constant, linear, quadratic, scale].iter().all(|v| v.is_finite())
                || scale <= 0.0 =>
            {
                Err(FusionError::InvalidConfig(
                    "quadratic truncator needs finite coefficients and scale > 0".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FusionConfig
// ────────────────────────────────────────────────────────────────────────────

/// Fixed parameters of a fusion engine.
///
/// Changing any of them through `FusionEngine::configure` discards the
/// volume, since chunk geometry cannot change under existing chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Voxels per chunk along x, y, z.
    #[serde(default = "default_chunk_dims")]
    pub chunk_dims: [usize; 3],

    /// Voxel edge length (metres).
    #[serde(default = "default_resolution")]
    pub resolution: f32,

    /// Upper bound on a voxel's accumulated weight.
    #[serde(default = "default_max_weight")]
    pub max_weight: f32,

    /// Weight added per observation.
    #[serde(default = "default_increment_weight")]
    pub increment_weight: f32,

    /// Clear observed voxels that a newer frame sees as free space.
    #[serde(default = "default_use_carving")]
    pub use_carving: bool,

    /// Extra margin in front of the truncation band before carving starts
    /// (metres).
    #[serde(default = "default_carving_distance")]
    pub carving_distance: f32,

    /// Depth samples closer than this are ignored (metres).
    #[serde(default = "default_near_plane")]
    pub near_plane: f32,

    /// Depth samples further than this are ignored (metres).
    #[serde(default = "default_far_plane")]
    pub far_plane: f32,

    /// Band used by the point integrator. `None` means one voxel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_truncation: Option<f32>,

    /// Worker threads; `0` lets rayon pick one per core.
    #[serde(default)]
    pub thread_count: usize,

    /// Refresh dirty meshes at the end of every integration pass.
    #[serde(default)]
    pub mesh_after_integration: bool,

    #[serde(default)]
    pub truncator: Truncator,
}

fn default_chunk_dims() -> [usize; 3] {
    [16, 16, 16]
}
fn default_resolution() -> f32 {
    0.05
}
fn default_max_weight() -> f32 {
    100.0
}
fn default_increment_weight() -> f32 {
    1.0
}
fn default_use_carving() -> bool {
    true
}
fn default_carving_distance() -> f32 {
    0.05
}
fn default_near_plane() -> f32 {
    0.05
}
fn default_far_plane() -> f32 {
    5.0
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            chunk_dims: default_chunk_dims(),
            resolution: default_resolution(),
            max_weight: default_max_weight(),
            increment_weight: default_increment_weight(),
            use_carving: default_use_carving(),
            carving_distance: default_carving_distance(),
            near_plane: default_near_plane(),
            far_plane: default_far_plane(),
            point_truncation: None,
            thread_count: 0,
            mesh_after_integration: false,
            truncator: Truncator::default(),
        }
    }
}

impl FusionConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), FusionError> {
        let invalid = |msg: String| -> Result<(), FusionError> { Err(FusionError::InvalidConfig(msg)) };

        if self.chunk_dims.contains(&0) {
            return invalid(format!("chunk_dims must be non-zero, got {:?}", self.chunk_dims));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return invalid(format!("resolution must be > 0, got {}", self.resolution));
        }
        if !(self.max_weight.is_finite() && self.max_weight > 0.0) {
            return invalid(format!("max_weight must be > 0, got {}", self.max_weight));
        }
        if !(self.increment_weight.is_finite() && self.increment_weight > 0.0) {
            return invalid(format!(
                "increment_weight must be > 0, got {}",
                self.increment_weight
            ));
        }
        if !(self.carving_distance.is_finite() && self.carving_distance >= 0.0) {
            return invalid(format!(
                "carving_distance must be >= 0, got {}",
                self.carving_distance
            ));
        }
        if !(self.near_plane.is_finite() && self.near_plane > 0.0) {
            return invalid(format!("near_plane must be > 0, got {}", self.near_plane));
        }
        if !self.far_plane.is_finite() || self.far_plane <= self.near_plane {
            return invalid(format!(
                "far_plane ({}) must exceed near_plane ({})",
                self.far_plane, self.near_plane
            ));
        }
        if let Some(t) = self.point_truncation
            && !(t.is_finite() && t > 0.0)
        {
            return invalid(format!("point_truncation must be > 0, got {t}"));
        }
        self.truncator.validate()
    }

    /// Band used by the point integrator.
    pub fn point_band(&self) -> f32 {
        self.point_truncation.unwrap_or(self.resolution)
    }

    /// Carving margin, or `None` when carving is disabled.
    pub fn carving(&self) -> Option<f32> {
        self.use_carving.then_some(self.carving_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(FusionConfig::default().validate().is_ok());
    }

    #[test]
    fn constant_truncator_is_floored_at_one_voxel() {
        let t = Truncator::Constant { distance: 0.01 };
        assert!((t.distance(1.0, 0.05) - 0.05).abs() < 1e-6);
        let t = Truncator::Constant { distance: 0.2 };
        assert!((t.distance(1.0, 0.05) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn quadratic_truncator_grows_with_depth() {
        let t = Truncator::Quadratic {
            constant: 0.0,
            linear: 0.0,
            quadratic: 0.1,
            scale: 1.0,
        };
        assert!((t.distance(2.0, 0.01) - 0.4).abs() < 1e-6);
        assert!(t.distance(3.0, 0.01) > t.distance(2.0, 0.01));
    }

    #[test]
    fn zero_chunk_dims_rejected() {
        let cfg = FusionConfig {
            chunk_dims: [16, 0, 16],
            ..FusionConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FusionError::InvalidConfig(_))));
    }

    #[test]
    fn near_beyond_far_rejected() {
        let cfg = FusionConfig {
            near_plane: 3.0,
            far_plane: 2.0,
            ..FusionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_resolution_rejected() {
        for res in [0.0, -0.1, f32::NAN] {
            let cfg = FusionConfig {
                resolution: res,
                ..FusionConfig::default()
            };
            assert!(cfg.validate().is_err(), "resolution {res} accepted");
        }
    }

    #[test]
    fn bad_truncator_rejected() {
        let cfg = FusionConfig {
            truncator: Truncator::Constant { distance: 0.0 },
            ..FusionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn point_band_defaults_to_resolution() {
        let cfg = FusionConfig::default();
        assert_eq!(cfg.point_band(), cfg.resolution);
        let cfg = FusionConfig {
            point_truncation: Some(0.2),
            ..FusionConfig::default()
        };
        assert_eq!(cfg.point_band(), 0.2);
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = FusionConfig {
            chunk_dims: [8, 8, 32],
            truncator: Truncator::Constant { distance: 0.1 },
            use_carving: false,
            thread_count: 3,
            ..FusionConfig::default()
        };
        let raw = toml::to_string(&cfg).unwrap();
        assert!(raw.contains("kind = \"constant\""));
        let back: FusionConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: FusionConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, FusionConfig::default());
    }
}
