use anyhow::{anyhow, Result};
use glam::Vec3;
use skinrig::assets::AssetManager;
use skinrig::environment::FlatTerrain;
use skinrig::model::{linear_track, ModelAsset, ModelBuilder};
use skinrig::renderer::RecordingDevice;
use skinrig::time::FrameTime;
use skinrig::{DirtyFlags, EngineConfig, FrameContext, ModelId, ModelWorld, ObjectClass};
use std::sync::Arc;

fn statue(name: &str) -> Arc<ModelAsset> {
    ModelBuilder::new(name)
        .action(1, 1.0)
        .bone("root", None, vec![linear_track(1, Vec3::Z, 0.0)])
        .quad(Some("skin.png"), 0, 10.0)
        .shared()
}

fn flags(world: &ModelWorld, id: ModelId) -> Result<DirtyFlags> {
    world.get(id).map(|object| object.dirty_flags()).ok_or_else(|| anyhow!("missing {id:?}"))
}

struct Scene {
    world: ModelWorld,
    assets: AssetManager,
    device: RecordingDevice,
    time: FrameTime,
    parent: ModelId,
    linked: ModelId,
    free: ModelId,
}

impl Scene {
    fn build() -> Result<Self> {
        let mut assets = AssetManager::new();
        assets.register_texture("skin.png", false);
        let mut world = ModelWorld::new(EngineConfig::default());
        let parent = world.spawn("rider", ObjectClass::Player);
        let linked = world.spawn("helm", ObjectClass::Other);
        let free = world.spawn("pet", ObjectClass::Other);
        if let Some(object) = world.get_mut(linked) {
            object.parent_bone_link = Some(0);
        }
        world.attach_child(parent, linked)?;
        world.attach_child(parent, free)?;
        for (id, name) in [(parent, "rider"), (linked, "helm"), (free, "pet")] {
            pollster::block_on(world.load_content(id, Some(statue(name)), &assets, &assets))?;
            if let Some(object) = world.get_mut(id) {
                object.light_enabled = false;
            }
        }
        let mut scene = Self { world, assets, device: RecordingDevice::new(), time: FrameTime::default(), parent, linked, free };
        scene.tick();
        Ok(scene)
    }

    fn tick(&mut self) {
        self.time = self.time.advanced(1.0 / 60.0);
        let terrain = FlatTerrain::default();
        let ctx = FrameContext { time: self.time, terrain: &terrain, textures: &self.assets };
        self.world.update(&ctx, &mut self.device);
    }
}

#[test]
fn full_update_clears_every_flag() -> Result<()> {
    let scene = Scene::build()?;
    for id in [scene.parent, scene.linked, scene.free] {
        assert_eq!(flags(&scene.world, id)?, DirtyFlags::empty(), "{id:?}");
    }
    Ok(())
}

#[test]
fn transform_skips_linked_children_only() -> Result<()> {
    let mut scene = Scene::build()?;
    scene.world.invalidate(scene.parent, DirtyFlags::TRANSFORM | DirtyFlags::LIGHTING);
    assert_eq!(flags(&scene.world, scene.parent)?, DirtyFlags::TRANSFORM | DirtyFlags::LIGHTING);
    assert_eq!(flags(&scene.world, scene.linked)?, DirtyFlags::LIGHTING);
    assert_eq!(flags(&scene.world, scene.free)?, DirtyFlags::TRANSFORM | DirtyFlags::LIGHTING);
    Ok(())
}

#[test]
fn colour_change_reaches_children_as_material() -> Result<()> {
    let mut scene = Scene::build()?;
    scene.world.set_color(scene.parent, Vec3::new(1.0, 0.5, 0.5));
    assert!(flags(&scene.world, scene.linked)?.contains(DirtyFlags::MATERIAL));
    assert!(flags(&scene.world, scene.free)?.contains(DirtyFlags::MATERIAL));
    Ok(())
}

#[test]
fn invisible_objects_keep_pending_flags() -> Result<()> {
    let mut scene = Scene::build()?;
    if let Some(object) = scene.world.get_mut(scene.free) {
        object.visible = false;
    }
    scene.world.invalidate(scene.free, DirtyFlags::MATERIAL);
    scene.tick();
    assert!(flags(&scene.world, scene.free)?.contains(DirtyFlags::MATERIAL));

    if let Some(object) = scene.world.get_mut(scene.free) {
        object.visible = true;
    }
    scene.tick();
    assert_eq!(flags(&scene.world, scene.free)?, DirtyFlags::empty());
    Ok(())
}

#[test]
fn moving_the_parent_moves_children_without_reskinning() -> Result<()> {
    let mut scene = Scene::build()?;
    if let Some(object) = scene.world.get_mut(scene.parent) {
        object.position = Vec3::new(50.0, 0.0, 0.0);
    }
    scene.tick();
    for id in [scene.parent, scene.free] {
        let object = scene.world.get(id).ok_or_else(|| anyhow!("missing {id:?}"))?;
        assert_eq!(object.mesh_slots()[0].cache.last_update_frame, 1, "{id:?} was reskinned");
    }
    let free = scene.world.get(scene.free).ok_or_else(|| anyhow!("pet missing"))?;
    assert_eq!(free.world_matrix().w_axis.x, 50.0);
    let linked = scene.world.get(scene.linked).ok_or_else(|| anyhow!("helm missing"))?;
    assert_eq!(linked.world_matrix().w_axis.x, 50.0);
    for id in [scene.parent, scene.linked, scene.free] {
        assert_eq!(flags(&scene.world, id)?, DirtyFlags::empty(), "{id:?}");
    }
    Ok(())
}
