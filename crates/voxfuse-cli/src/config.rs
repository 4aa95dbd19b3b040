//! Run configuration – reads/writes `~/.voxfuse/config.toml`.
//!
//! The `[fusion]` table is a [`FusionConfig`] verbatim; the other keys
//! describe the synthetic capture the driver renders.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use voxfuse_fusion::FusionConfig;

use crate::scene::Scene;

/// Persisted driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where the fused mesh is written.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub scene: Scene,

    /// Number of frames rendered along the camera sweep.
    #[serde(default = "default_frames")]
    pub frames: usize,

    /// Emit colour frames alongside depth.
    #[serde(default = "default_color")]
    pub color: bool,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub fusion: FusionConfig,
}

/// The synthetic pinhole sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_sensor_id")]
    pub sensor_id: String,
    /// Focal length in pixels (square pixels, centred principal point).
    #[serde(default = "default_focal")]
    pub focal: f32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_output() -> PathBuf {
    PathBuf::from("voxfuse.ply")
}
fn default_frames() -> usize {
    8
}
fn default_color() -> bool {
    true
}
fn default_sensor_id() -> String {
    "depth_front".to_string()
}
fn default_focal() -> f32 {
    160.0
}
fn default_width() -> u32 {
    160
}
fn default_height() -> u32 {
    120
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            sensor_id: default_sensor_id(),
            focal: default_focal(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: default_output(),
            scene: Scene::default(),
            frames: default_frames(),
            color: default_color(),
            camera: CameraConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

/// Return the path to `~/.voxfuse/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".voxfuse").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VOXFUSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VOXFUSE_THREADS` | `fusion.thread_count` |
/// | `VOXFUSE_RESOLUTION` | `fusion.resolution` |
/// | `VOXFUSE_CARVING` | `fusion.use_carving` (`true`/`false`/`1`/`0`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
pub(crate) fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("VOXFUSE_THREADS")
        && let Ok(n) = v.trim().parse::<usize>()
    {
        cfg.fusion.thread_count = n;
    }
    if let Some(v) = lookup("VOXFUSE_RESOLUTION")
        && let Ok(r) = v.trim().parse::<f32>()
    {
        cfg.fusion.resolution = r;
    }
    if let Some(v) = lookup("VOXFUSE_CARVING") {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" => cfg.fusion.use_carving = true,
            "0" | "false" | "off" => cfg.fusion.use_carving = false,
            _ => {}
        }
    }
}

/// Save the config to a specific path, creating the parent directory.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use voxfuse_fusion::Truncator;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.frames, 8);
        assert_eq!(loaded.scene, Scene::Plane);
        assert_eq!(loaded.output, PathBuf::from("voxfuse.ply"));
        assert_eq!(loaded.camera, CameraConfig::default());
        assert_eq!(loaded.fusion.chunk_dims, [16, 16, 16]);
        assert_eq!(loaded.fusion.truncator, Truncator::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("voxfuse.toml");
        std::fs::write(
            &path,
            "scene = \"box\"\nframes = 3\n\n[fusion]\nchunk_dims = [8, 8, 8]\n\n[fusion.truncator]\nkind = \"constant\"\ndistance = 0.2\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.scene, Scene::Box);
        assert_eq!(cfg.frames, 3);
        assert_eq!(cfg.fusion.chunk_dims, [8, 8, 8]);
        assert_eq!(cfg.fusion.truncator, Truncator::Constant { distance: 0.2 });
        assert_eq!(cfg.camera.width, 160);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("voxfuse.toml");
        std::fs::write(&path, "frames = \"many\"").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_voxfuse_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".voxfuse"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn overrides_change_threads_and_resolution() {
        let mut cfg = Config::default();
        apply_overrides_from(
            &mut cfg,
            vars(&[("VOXFUSE_THREADS", "3"), ("VOXFUSE_RESOLUTION", " 0.02 ")]),
        );
        assert_eq!(cfg.fusion.thread_count, 3);
        assert_eq!(cfg.fusion.resolution, 0.02);
    }

    #[test]
    fn overrides_toggle_carving() {
        let mut cfg = Config::default();
        apply_overrides_from(&mut cfg, vars(&[("VOXFUSE_CARVING", "off")]));
        assert!(!cfg.fusion.use_carving);

        apply_overrides_from(&mut cfg, vars(&[("VOXFUSE_CARVING", "maybe")]));
        assert!(!cfg.fusion.use_carving);

        apply_overrides_from(&mut cfg, vars(&[("VOXFUSE_CARVING", "ON")]));
        assert!(cfg.fusion.use_carving);
    }

    #[test]
    fn unparseable_overrides_are_ignored() {
        let mut cfg = Config::default();
        apply_overrides_from(
            &mut cfg,
            vars(&[("VOXFUSE_THREADS", "many"), ("VOXFUSE_RESOLUTION", "fine")]),
        );
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn absent_variables_change_nothing() {
        let mut cfg = Config::default();
        apply_overrides_from(&mut cfg, vars(&[]));
        assert_eq!(cfg, Config::default());
    }
}
