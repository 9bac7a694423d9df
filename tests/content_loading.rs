use anyhow::{anyhow, Result};
use glam::Vec3;
use skinrig::assets::{AssetManager, AssetProvider};
use skinrig::camera3d::Camera3D;
use skinrig::environment::FlatTerrain;
use skinrig::model::{linear_track, ModelAsset, ModelBuilder};
use skinrig::object::LoadState;
use skinrig::renderer::{DeviceCommand, DrawPass, DrawReport, RecordingDevice};
use skinrig::time::FrameTime;
use skinrig::{EngineConfig, FrameContext, ModelId, ModelWorld, ObjectClass};
use std::fs;
use std::sync::Arc;

struct Loader {
    world: ModelWorld,
    assets: AssetManager,
    terrain: FlatTerrain,
    camera: Camera3D,
    device: RecordingDevice,
    time: FrameTime,
}

impl Loader {
    fn new() -> Self {
        let mut assets = AssetManager::new();
        assets.register_texture("npc/skin.png", false);
        assets.register_texture("npc/cape.png", true);
        Self {
            world: ModelWorld::new(EngineConfig::default()),
            assets,
            terrain: FlatTerrain::default(),
            camera: Camera3D::default(),
            device: RecordingDevice::new(),
            time: FrameTime::default(),
        }
    }

    fn load(&mut self, id: ModelId, model: Option<Arc<ModelAsset>>) -> Result<()> {
        pollster::block_on(self.world.load_content(id, model, &self.assets, &self.assets))
    }

    fn frame(&mut self) -> DrawReport {
        self.time = self.time.advanced(1.0 / 60.0);
        let ctx = FrameContext { time: self.time, terrain: &self.terrain, textures: &self.assets };
        self.world.update(&ctx, &mut self.device);
        let mut report = self.world.draw(DrawPass::Solid, &ctx, &self.camera, &mut self.device);
        report.merge(self.world.draw(DrawPass::Translucent, &ctx, &self.camera, &mut self.device));
        report
    }
}

fn guard(textures: &[&str]) -> Arc<ModelAsset> {
    let mut builder = ModelBuilder::new("npc/guard").action(1, 1.0).bone("root", None, vec![linear_track(1, Vec3::Z, 0.0)]);
    for texture in textures {
        builder = builder.quad(Some(texture), 0, 10.0);
    }
    builder.shared()
}

#[test]
fn textures_are_resident_before_the_object_is_ready() -> Result<()> {
    let mut loader = Loader::new();
    let id = loader.world.spawn("guard", ObjectClass::Npc);
    assert_eq!(loader.world.get(id).map(|object| object.state()), Some(LoadState::Pending));
    loader.load(id, Some(guard(&["skin.png", "cape.png"])))?;

    assert_eq!(loader.assets.prepare_calls(), 2);
    let object = loader.world.get(id).ok_or_else(|| anyhow!("guard missing"))?;
    assert!(object.is_ready());
    let paths: Vec<_> = object.mesh_slots().iter().map(|slot| slot.texture_path.clone()).collect();
    assert_eq!(paths, vec![Some("npc/skin.png".to_string()), Some("npc/cape.png".to_string())]);

    let report = loader.frame();
    assert_eq!(report.draw_calls, 2);
    assert_eq!(loader.assets.lazy_fetches(), 0);
    Ok(())
}

#[test]
fn missing_model_leaves_a_ready_empty_object() -> Result<()> {
    let mut loader = Loader::new();
    let id = loader.world.spawn("empty slot", ObjectClass::Other);
    pollster::block_on(loader.world.load_from(id, "npc/unknown", &loader.assets, &loader.assets))?;
    let object = loader.world.get(id).ok_or_else(|| anyhow!("slot missing"))?;
    assert!(object.is_ready());
    assert!(object.model().is_none());
    assert_eq!(loader.frame(), DrawReport::default());
    assert_eq!(loader.device.live_buffers(), 0);
    Ok(())
}

#[test]
fn unregistered_texture_only_drops_its_mesh() -> Result<()> {
    let mut loader = Loader::new();
    let id = loader.world.spawn("guard", ObjectClass::Npc);
    loader.load(id, Some(guard(&["skin.png", "lost.png"])))?;
    let report = loader.frame();
    assert_eq!(report.draw_calls, 1);
    assert_eq!(report.draw_failures, 0);
    let object = loader.world.get(id).ok_or_else(|| anyhow!("guard missing"))?;
    assert!(object.mesh_slots()[1].texture.is_none());
    Ok(())
}

#[test]
fn reassigning_the_same_model_is_a_no_op() -> Result<()> {
    let mut loader = Loader::new();
    let model = guard(&["skin.png"]);
    let id = loader.world.spawn("guard", ObjectClass::Npc);
    pollster::block_on(loader.world.assign_model(id, Some(model.clone()), &loader.assets, &loader.assets))?;
    loader.frame();
    let calls = loader.assets.prepare_calls();
    pollster::block_on(loader.world.assign_model(id, Some(model), &loader.assets, &loader.assets))?;
    assert_eq!(loader.assets.prepare_calls(), calls);
    assert!(loader.world.get(id).is_some_and(|object| object.dirty_flags().is_empty()));
    Ok(())
}

#[test]
fn swapping_models_releases_the_old_buffers() -> Result<()> {
    let mut loader = Loader::new();
    let id = loader.world.spawn("guard", ObjectClass::Npc);
    loader.load(id, Some(guard(&["skin.png"])))?;
    loader.frame();
    let old = loader
        .world
        .get(id)
        .and_then(|object| object.mesh_slots()[0].cache.buffers())
        .ok_or_else(|| anyhow!("no buffers after first frame"))?;
    assert_eq!(loader.device.live_buffers(), 2);

    loader.load(id, Some(guard(&["cape.png"])))?;
    loader.device.clear();
    let report = loader.frame();
    assert_eq!(report.draw_calls, 1);
    let released: Vec<_> = loader
        .device
        .commands()
        .iter()
        .filter_map(|command| match command {
            DeviceCommand::Release(buffer) => Some(*buffer),
            _ => None,
        })
        .collect();
    assert!(released.contains(&old.0) && released.contains(&old.1));
    assert_eq!(loader.device.live_buffers(), 2);
    Ok(())
}

#[test]
fn dispose_releases_the_whole_subtree() -> Result<()> {
    let mut loader = Loader::new();
    let rider = loader.world.spawn("rider", ObjectClass::Player);
    let mount = loader.world.spawn("mount", ObjectClass::Other);
    loader.world.attach_child(rider, mount)?;
    loader.load(rider, Some(guard(&["skin.png"])))?;
    loader.load(mount, Some(guard(&["skin.png", "cape.png"])))?;
    loader.frame();
    assert_eq!(loader.device.live_buffers(), 6);

    loader.world.dispose(rider, &mut loader.device);
    assert_eq!(loader.device.live_buffers(), 0);
    for id in [rider, mount] {
        assert_eq!(loader.world.get(id).map(|object| object.state()), Some(LoadState::Disposed));
    }

    loader.device.clear();
    assert_eq!(loader.frame(), DrawReport::default());
    assert!(loader.device.commands().is_empty());
    assert!(loader.load(mount, Some(guard(&["skin.png"]))).is_err());
    Ok(())
}

#[test]
fn config_file_overrides_only_named_fields() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.json");
    fs::write(&path, r#"{ "animation": { "throttle_hz": 10.0 }, "render": { "shadows_enabled": false } }"#)?;
    let config = EngineConfig::load(&path)?;
    assert!((config.animation.throttle_interval_ms() - 100.0).abs() < 1e-9);
    assert!(!config.render.shadows_enabled);
    assert!((config.animation.blend_duration - 0.25).abs() < f32::EPSILON);

    let fallback = EngineConfig::load_or_default(dir.path().join("missing.json"));
    assert!(fallback.render.shadows_enabled);
    assert!(EngineConfig::load(dir.path().join("missing.json")).is_err());
    Ok(())
}

#[test]
fn registry_hands_out_shared_models() -> Result<()> {
    let mut assets = AssetManager::new();
    assets.insert_model("npc/guard", (*guard(&["skin.png"])).clone());
    let first = assets.retain_model("npc/guard")?;
    let second = assets.model("npc/guard").ok_or_else(|| anyhow!("guard not registered"))?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(assets.model_ref_count("npc/guard"), 1);
    Ok(())
}
