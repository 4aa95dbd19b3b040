//! `voxfuse` – fuse a synthetic depth capture into a mesh.
//!
//! ```text
//! voxfuse [CONFIG] [OUTPUT.ply] [--scene plane|box] [--frames N] [--write-default-config]
//! ```
//!
//! 1. Loads `CONFIG` (default `~/.voxfuse/config.toml`; built-in defaults
//!    when that file is absent) and applies `VOXFUSE_*` overrides.
//! 2. Builds a [`FusionEngine`] and registers one pinhole sensor.
//! 3. Renders the chosen scene from a short camera sweep and integrates
//!    every frame.
//! 4. Extracts the meshes and writes them to `OUTPUT.ply` as ASCII PLY.

mod config;
mod scene;
mod telemetry;

use clap::Parser;
use colored::Colorize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::info;

use voxfuse_camera::{Intrinsics, PinholeCamera};
use voxfuse_fusion::FusionEngine;

use crate::scene::Scene;

fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = telemetry::init_tracing("voxfuse");

    print_banner();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("  {} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

/// voxfuse - fuse a synthetic depth capture into a mesh
#[derive(Parser, Debug, Default, PartialEq)]
#[command(name = "voxfuse", version, long_about = None)]
struct Args {
    /// Config file (default: ~/.voxfuse/config.toml)
    config: Option<PathBuf>,

    /// Where to write the PLY mesh (overrides the config's `output`)
    output: Option<PathBuf>,

    /// Scene to render
    #[arg(long, value_enum)]
    scene: Option<Scene>,

    /// Frames along the camera sweep
    #[arg(long)]
    frames: Option<NonZeroUsize>,

    /// Write the default config to CONFIG and exit
    #[arg(long, default_value_t = false)]
    write_default_config: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

fn run(args: Args) -> Result<(), String> {
    let path = args.config.clone().unwrap_or_else(config::config_path);

    if args.write_default_config {
        config::save_to(&config::Config::default(), &path)?;
        println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        );
        return Ok(());
    }

    let mut cfg = match config::load_from(&path)? {
        Some(cfg) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        None if args.config.is_some() => {
            return Err(format!("config file {} not found", path.display()));
        }
        None => {
            println!("  {}", "No config file found; using defaults.".dimmed());
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    if let Some(scene) = args.scene {
        cfg.scene = scene;
    }
    if let Some(frames) = args.frames {
        cfg.frames = frames.get();
    }
    if let Some(output) = args.output {
        cfg.output = output;
    }

    let mut engine = FusionEngine::new(cfg.fusion.clone()).map_err(|e| e.to_string())?;
    let camera = PinholeCamera::new(Intrinsics::centred(
        cfg.camera.focal,
        cfg.camera.width,
        cfg.camera.height,
    ));
    engine
        .register_sensor(cfg.camera.sensor_id.clone(), camera.into())
        .map_err(|e| e.to_string())?;

    println!(
        "  Fusing {} frame(s) of the {} scene at {} m resolution\n",
        cfg.frames.to_string().bold(),
        cfg.scene.to_string().bold(),
        cfg.fusion.resolution
    );

    let started = Instant::now();
    for (n, pose) in scene::sweep(cfg.frames).iter().enumerate() {
        let depth = cfg.scene.render_depth(&camera, pose);
        let color = cfg
            .color
            .then(|| cfg.scene.render_color(&camera, pose));
        let report = engine
            .integrate_depth_frame(&cfg.camera.sensor_id, &depth, color.as_ref(), pose)
            .map_err(|e| e.to_string())?;
        println!(
            "    frame {:>3}  {} chunks  {} updated  {} carved",
            n + 1,
            report.chunks_touched.to_string().cyan(),
            report.voxels_updated,
            report.voxels_carved
        );
    }

    let export = engine.export_mesh(&cfg.output).map_err(|e| e.to_string())?;
    let elapsed = started.elapsed();
    info!(
        frames = cfg.frames,
        chunks = engine.chunk_count(),
        elapsed_ms = elapsed.as_secs_f64() * 1e3,
        "run complete"
    );

    println!();
    println!(
        "  {} Wrote {} ({} vertices, {} triangles from {} chunk(s))",
        "✓".green().bold(),
        export.path.display().to_string().bold(),
        export.vertices,
        export.triangles,
        export.chunks
    );
    println!(
        "    {} chunks allocated, {} voxels observed, {:.1} ms",
        engine.chunk_count(),
        engine.observed_voxel_count(),
        elapsed.as_secs_f64() * 1e3
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _  ______  __ ____ _  _ ___ ___ "#.bold().cyan());
    println!("{}", r#"| |/ / __ \ \/ / __/ / / / __/ __/"#.bold().cyan());
    println!("{}", r#"| / / /_/ />  </ _// /_/ /\ \/ _/  "#.bold().cyan());
    println!("{}", r#"|__/\____/_/\_/_/  \____/___/___/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "voxfuse".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Chunked TSDF fusion");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    fn parse(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("voxfuse").chain(list.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn no_arguments_means_defaults() {
        assert_eq!(parse(&[]).unwrap(), Args::default());
    }

    #[test]
    fn positional_paths_and_flags() {
        let a = parse(&["run.toml", "out.ply", "--scene", "box", "--frames", "4"]).unwrap();
        assert_eq!(a.config, Some(PathBuf::from("run.toml")));
        assert_eq!(a.output, Some(PathBuf::from("out.ply")));
        assert_eq!(a.scene, Some(Scene::Box));
        assert_eq!(a.frames, NonZeroUsize::new(4));
        assert!(!a.write_default_config);
    }

    #[test]
    fn flags_may_precede_paths() {
        let a = parse(&["--write-default-config", "cfg.toml"]).unwrap();
        assert!(a.write_default_config);
        assert_eq!(a.config, Some(PathBuf::from("cfg.toml")));
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse(&["--frames", "0"]).is_err());
        assert!(parse(&["--frames"]).is_err());
        assert!(parse(&["--scene", "sphere"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["a", "b", "c"]).is_err());
    }

    #[test]
    fn help_and_version_are_available() {
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse(&["--version"]).unwrap_err().kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn run_writes_config_then_mesh() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg_path = dir.path().join("voxfuse.toml");
        let out_path = dir.path().join("scene.ply");

        run(Args {
            config: Some(cfg_path.clone()),
            write_default_config: true,
            ..Args::default()
        })
        .expect("write default");
        assert!(cfg_path.exists());

        run(Args {
            config: Some(cfg_path),
            output: Some(out_path.clone()),
            scene: Some(Scene::Box),
            frames: NonZeroUsize::new(2),
            ..Args::default()
        })
        .expect("fuse");
        let ply = std::fs::read_to_string(&out_path).expect("mesh written");
        assert!(ply.starts_with("ply\n"));
        assert!(ply.contains("property uchar red"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = run(Args {
            config: Some(dir.path().join("absent.toml")),
            ..Args::default()
        })
        .unwrap_err();
        assert!(err.contains("not found"));
    }
}
