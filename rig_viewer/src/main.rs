//! Headless rig viewer
//!
//! Loads a configuration (TOML or RON, given as the first argument), builds
//! the rig scene on an offscreen surface, exercises a few parameter inputs
//! and reports engine statistics.
//!
//! ```text
//! rig_viewer [config.toml] [frames]
//! ```

use std::time::Duration;

use rig_engine::config::Config;
use rig_engine::foundation::logging;
use rig_engine::prelude::*;

const DEFAULT_FRAMES: u64 = 120;
const TASK_TIMEOUT: Duration = Duration::from_secs(10);

fn load_config(path: Option<&str>) -> Result<RigConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => RigConfig::load_from_file(path)?,
        None => RigConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up panic hook for better error reporting
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC occurred: {:?}", panic_info);

        if let Some(location) = panic_info.location() {
            eprintln!("Panic location: {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(String::as_str))?;
    let frames = match args.get(1) {
        Some(value) => value.parse::<u64>()?,
        None => DEFAULT_FRAMES,
    };

    logging::init_with_level(&config.logging.level);

    log::info!("Starting rig viewer");

    let mut orchestrator = Orchestrator::new(config);
    let mut surface = HeadlessSurface::new(1280, 720).with_label("offscreen");
    if let Err(e) = orchestrator.initialize(Some(&mut surface)) {
        log::error!("Initialization failed: {}", e);
        return Err(e.into());
    }

    if orchestrator.config().landmarks.enabled && !orchestrator.probe_landmark_service() {
        log::warn!("Landmark service not ready; requests stay queued");
    }

    orchestrator.wait_for_tasks(TASK_TIMEOUT)?;
    orchestrator.run(frames / 2)?;

    orchestrator.on_input_changed("monitor-distance", 15.0)?;
    orchestrator.on_input_changed("monitor-elevation", 10.0)?;
    orchestrator.on_input_changed("show-landmarks", true)?;
    orchestrator.flush_parameters();
    orchestrator.run(frames - frames / 2)?;

    if orchestrator.fit_camera_to_scene() {
        log::info!("Camera fitted to scene at {:?}", orchestrator.camera().position);
    }

    for entry in orchestrator.scene_listing() {
        println!(
            "{}{} [{}]{}",
            "  ".repeat(entry.depth),
            entry.name,
            entry.node_type,
            if entry.visible { "" } else { " (hidden)" }
        );
    }

    let stats = orchestrator.stats();
    println!(
        "nodes: {}, render objects: {}, meshes: {}, materials: {}, frames: {}, last draws: {}",
        stats.nodes,
        stats.engine.render_objects,
        stats.engine.live_meshes,
        stats.engine.live_materials,
        stats.engine.frames_rendered,
        stats.engine.last_draw_count
    );

    orchestrator.dispose();
    log::info!("Rig viewer finished");
    Ok(())
}
