use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use serde_json::json;
use skinrig::assets::AssetManager;
use skinrig::camera3d::Camera3D;
use skinrig::environment::FlatTerrain;
use skinrig::model::{linear_track, spin_track, ModelAsset, ModelBuilder};
use skinrig::renderer::{DrawPass, DrawReport, RecordingDevice};
use skinrig::time::FrameTime;
use skinrig::{EngineConfig, FrameContext, ModelWorld, ObjectClass};
use std::env;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run() {
        eprintln!("rig_check error: {err:?}");
        process::exit(1);
    }
}

struct CliOptions {
    ticks: u32,
    delta: f32,
    switch_at: Option<u32>,
    config: Option<String>,
    json: bool,
    show_help: bool,
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_cli_args(&args)?;
    if options.show_help {
        print_usage();
        return Ok(());
    }
    let config = match &options.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let mut assets = AssetManager::new();
    assets.register_texture("rig/body.png", false);
    assets.register_scripted_texture("rig/aura.png", true, false, true);
    assets.register_texture("rig/blade.png", false);
    assets.insert_model("rig/check", check_rig());
    assets.insert_model("rig/blade", blade());

    let mut world = ModelWorld::new(config);
    let body = world.spawn("subject", ObjectClass::Player);
    let blade = world.spawn("blade", ObjectClass::Other);
    if let Some(object) = world.get_mut(blade) {
        object.parent_bone_link = Some(2);
    }
    world.attach_child(body, blade)?;
    world.set_render_shadow(body, true);
    pollster::block_on(world.load_from(body, "rig/check", &assets, &assets)).context("loading check rig")?;
    pollster::block_on(world.load_from(blade, "rig/blade", &assets, &assets)).context("loading blade")?;

    let terrain = FlatTerrain::new(Vec3::splat(200.0), 0.0);
    let camera = Camera3D::default().with_viewport(1280, 720);
    let mut device = RecordingDevice::new();
    let mut time = FrameTime::default();
    let mut draws = DrawReport::default();

    for tick in 0..options.ticks {
        if options.switch_at == Some(tick) {
            if let Some(object) = world.get_mut(body) {
                object.current_action = 1;
            }
        }
        time = time.advanced(options.delta);
        let ctx = FrameContext { time, terrain: &terrain, textures: &assets };
        world.update(&ctx, &mut device);
        draws.merge(world.draw(DrawPass::Solid, &ctx, &camera, &mut device));
        draws.merge(world.draw(DrawPass::Translucent, &ctx, &camera, &mut device));
    }

    let stats = world.stats();
    let phase = world.get(body).map(|object| format!("{:?}", object.animator().phase())).unwrap_or_default();
    if options.json {
        let value = json!({
            "ticks": options.ticks,
            "phase": phase,
            "stats": stats,
            "live_buffers": device.live_buffers(),
            "lazy_texture_fetches": assets.lazy_fetches(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Ran {} ticks at {:.4}s, final phase {phase}", options.ticks, options.delta);
        println!(
            "poses {} (cache hits {}), buffers rebuilt {} skipped {}",
            stats.poses_generated, stats.pose_cache_hits, stats.buffer_rebuilds, stats.buffer_skips
        );
        println!(
            "state binds {}, draws {}, failures {}, fallbacks {}",
            draws.state_binds, draws.draw_calls, draws.draw_failures, draws.fallbacks
        );
    }
    Ok(())
}

fn check_rig() -> ModelAsset {
    ModelBuilder::new("rig/check")
        .action(8, 1.0)
        .action(6, 0.5)
        .bone("root", None, vec![linear_track(8, Vec3::Z, 0.5), linear_track(6, Vec3::Z, 1.0)])
        .bone("spine", Some(0), vec![spin_track(8, Vec3::Z * 20.0, 0.1), spin_track(6, Vec3::Z * 20.0, -0.2)])
        .bone("hand", Some(1), vec![spin_track(8, Vec3::X * 12.0, 0.05), linear_track(6, Vec3::X, 2.0)])
        .quad(Some("body.png"), 1, 40.0)
        .quad(Some("aura.png"), 0, 60.0)
        .build()
}

fn blade() -> ModelAsset {
    ModelBuilder::new("rig/blade")
        .bone("grip", None, vec![])
        .quad(Some("blade.png"), 0, 30.0)
        .build()
}

fn print_usage() {
    eprintln!(
        "Rig Check

Usage:
  rig_check [--ticks N] [--dt SECONDS] [--switch-at TICK] [--config PATH] [--json]

Builds a procedural two-action rig with a bone-linked attachment, runs the
update and both draw passes against a recording device and prints frame
statistics.
"
    );
}

fn parse_cli_args(args: &[String]) -> Result<CliOptions> {
    let mut options =
        CliOptions { ticks: 120, delta: 1.0 / 60.0, switch_at: None, config: None, json: false, show_help: false };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--ticks" => options.ticks = parse_value(arg, iter.next())?,
            "--dt" => options.delta = parse_value(arg, iter.next())?,
            "--switch-at" => options.switch_at = Some(parse_value(arg, iter.next())?),
            "--config" => {
                options.config = Some(iter.next().ok_or_else(|| anyhow!("'{arg}' expects a path"))?.clone())
            }
            "--json" => options.json = true,
            "--help" | "-h" => options.show_help = true,
            _ => return Err(anyhow!("unknown argument '{arg}'")),
        }
    }
    Ok(options)
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T> {
    let raw = value.ok_or_else(|| anyhow!("'{flag}' expects a value"))?;
    raw.parse().map_err(|_| anyhow!("invalid value '{raw}' for '{flag}'"))
}
