use anyhow::{anyhow, Result};
use glam::{Mat4, Quat, Vec3};
use skinrig::animation::{sample_frames, AnimationPhase, FadeSource};
use skinrig::assets::AssetManager;
use skinrig::environment::FlatTerrain;
use skinrig::model::{linear_track, spin_track, BoneKeyframeTrack, ModelAsset, ModelBuilder};
use skinrig::renderer::RecordingDevice;
use skinrig::skeleton::{compute_pose, lerp_mat4, FrameSample};
use skinrig::skinning::SkinnedVertex;
use skinrig::time::FrameTime;
use skinrig::{EngineConfig, FrameContext, ModelId, ModelWorld, ObjectClass};
use std::sync::Arc;

struct Harness {
    world: ModelWorld,
    assets: AssetManager,
    terrain: FlatTerrain,
    device: RecordingDevice,
    time: FrameTime,
}

impl Harness {
    fn new() -> Self {
        let mut assets = AssetManager::new();
        assets.register_texture("skin.png", false);
        Self {
            world: ModelWorld::new(EngineConfig::default()),
            assets,
            terrain: FlatTerrain::default(),
            device: RecordingDevice::new(),
            time: FrameTime::default(),
        }
    }

    fn spawn(&mut self, model: &Arc<ModelAsset>) -> Result<ModelId> {
        let id = self.world.spawn("subject", ObjectClass::Npc);
        pollster::block_on(self.world.load_content(id, Some(model.clone()), &self.assets, &self.assets))?;
        Ok(id)
    }

    fn tick(&mut self, dt: f32) {
        self.time = self.time.advanced(dt);
        let ctx = FrameContext { time: self.time, terrain: &self.terrain, textures: &self.assets };
        self.world.update(&ctx, &mut self.device);
    }

    fn bones(&self, id: ModelId) -> Result<Vec<Mat4>> {
        let object = self.world.get(id).ok_or_else(|| anyhow!("missing {id:?}"))?;
        Ok(object.bone_transforms().to_vec())
    }

    /// Checks that the uploaded vertices of mesh 0 are skinned with the object's live bones.
    fn assert_buffer_matches_bones(&self, id: ModelId, model: &ModelAsset) -> Result<Vec<Vec3>> {
        let object = self.world.get(id).ok_or_else(|| anyhow!("missing {id:?}"))?;
        let buffer = object.mesh_slots()[0].cache.vertex_buffer.ok_or_else(|| anyhow!("no vertex buffer"))?;
        let vertices: Vec<SkinnedVertex> =
            self.device.vertices(buffer).ok_or_else(|| anyhow!("buffer {buffer:?} not resident"))?;
        let bones = object.bone_transforms();
        let mut positions = Vec::with_capacity(vertices.len());
        for (vertex, source) in vertices.iter().zip(&model.meshes[0].vertices) {
            let expected = bones[source.bone as usize].transform_point3(source.position);
            let actual = Vec3::from_array(vertex.position);
            assert!(actual.abs_diff_eq(expected, 1e-4), "vertex at {actual} but bone puts it at {expected}");
            positions.push(actual);
        }
        Ok(positions)
    }
}

#[test]
fn single_frame_action_generates_pose_once() -> Result<()> {
    let model = ModelBuilder::new("statue")
        .action(1, 1.0)
        .bone("root", None, vec![linear_track(1, Vec3::Z, 0.0)])
        .quad(Some("skin.png"), 0, 10.0)
        .shared();
    let mut harness = Harness::new();
    let id = harness.spawn(&model)?;
    for _ in 0..1000 {
        harness.tick(1.0 / 60.0);
    }
    let object = harness.world.get(id).ok_or_else(|| anyhow!("statue missing"))?;
    assert_eq!(object.animator().pose_generations(), 1);
    assert_eq!(object.animator().phase(), AnimationPhase::SingleFrame);
    assert_eq!(harness.world.stats().poses_generated, 1);
    Ok(())
}

fn two_action_rig() -> Arc<ModelAsset> {
    let still = |offset: Vec3| BoneKeyframeTrack::new(vec![offset; 2], vec![Quat::IDENTITY; 2]);
    ModelBuilder::new("dancer")
        .action(2, 1.0)
        .action(4, 1.0)
        .bone("root", None, vec![still(Vec3::new(0.0, 0.0, 10.0)), linear_track(4, Vec3::X, 8.0)])
        .bone(
            "arm",
            Some(0),
            vec![still(Vec3::new(5.0, 0.0, 0.0)), spin_track(4, Vec3::new(5.0, 0.0, 0.0), 0.4)],
        )
        .quad(Some("skin.png"), 1, 10.0)
        .shared()
}

#[test]
fn cross_fade_midpoint_is_half_way_between_poses() -> Result<()> {
    let model = two_action_rig();
    let mut harness = Harness::new();
    let id = harness.spawn(&model)?;
    harness.tick(1.0 / 60.0);

    let mut from = Vec::new();
    compute_pose(&model, FrameSample::still(0), 0.0, &mut from);
    assert!(harness.bones(id)?.iter().zip(&from).all(|(a, b)| a.abs_diff_eq(*b, 1e-5)));

    if let Some(object) = harness.world.get_mut(id) {
        object.current_action = 1;
    }
    harness.tick(0.125);

    // 0.125 s at the default speed of 4 puts the new action half way into frame 0.
    let (sample, _) = sample_frames(1, 4, 0.5, false, false);
    let mut target = Vec::new();
    compute_pose(&model, sample, 0.0, &mut target);
    let bones = harness.bones(id)?;
    for (index, bone) in bones.iter().enumerate() {
        let expected = lerp_mat4(&from[index], &target[index], 0.5);
        assert!(bone.abs_diff_eq(expected, 1e-4), "bone {index}: {bone} vs {expected}");
    }
    let object = harness.world.get(id).ok_or_else(|| anyhow!("dancer missing"))?;
    assert_eq!(object.animator().phase(), AnimationPhase::Blending);
    Ok(())
}

#[test]
fn cross_fade_ends_on_the_new_pose() -> Result<()> {
    let model = two_action_rig();
    let mut harness = Harness::new();
    let id = harness.spawn(&model)?;
    harness.tick(1.0 / 60.0);
    if let Some(object) = harness.world.get_mut(id) {
        object.current_action = 1;
    }
    harness.tick(0.125);
    harness.tick(0.125);

    let (sample, _) = sample_frames(1, 4, 1.0, false, false);
    let mut target = Vec::new();
    compute_pose(&model, sample, 0.0, &mut target);
    let bones = harness.bones(id)?;
    assert!(bones.iter().zip(&target).all(|(a, b)| a.abs_diff_eq(*b, 1e-4)));

    harness.tick(1.0 / 60.0);
    let object = harness.world.get(id).ok_or_else(|| anyhow!("dancer missing"))?;
    assert_eq!(object.animator().phase(), AnimationPhase::Playing);
    assert!(object.animator().cross_fade().is_none());
    Ok(())
}

fn three_action_rig() -> Arc<ModelAsset> {
    let still = |offset: Vec3| BoneKeyframeTrack::new(vec![offset; 2], vec![Quat::IDENTITY; 2]);
    ModelBuilder::new("duelist")
        .action(2, 1.0)
        .action(4, 1.0)
        .action(4, 1.0)
        .bone(
            "root",
            None,
            vec![still(Vec3::new(0.0, 0.0, 10.0)), linear_track(4, Vec3::X, 8.0), linear_track(4, Vec3::Y, 6.0)],
        )
        .bone(
            "arm",
            Some(0),
            vec![
                still(Vec3::new(5.0, 0.0, 0.0)),
                spin_track(4, Vec3::new(5.0, 0.0, 0.0), 0.4),
                spin_track(4, Vec3::new(5.0, 0.0, 0.0), -0.3),
            ],
        )
        .quad(Some("skin.png"), 1, 10.0)
        .shared()
}

#[test]
fn action_change_mid_fade_restarts_from_the_blended_pose() -> Result<()> {
    let model = three_action_rig();
    let mut harness = Harness::new();
    let id = harness.spawn(&model)?;
    harness.tick(1.0 / 60.0);

    if let Some(object) = harness.world.get_mut(id) {
        object.current_action = 1;
    }
    harness.tick(0.1);
    let object = harness.world.get(id).ok_or_else(|| anyhow!("duelist missing"))?;
    let fade = object.animator().cross_fade().ok_or_else(|| anyhow!("no fade after first switch"))?;
    assert!(matches!(fade.source, FadeSource::Action { action: 0, .. }));
    let snapshot = harness.bones(id)?;

    if let Some(object) = harness.world.get_mut(id) {
        object.current_action = 2;
    }
    harness.tick(0.05);
    let object = harness.world.get(id).ok_or_else(|| anyhow!("duelist missing"))?;
    let fade = object.animator().cross_fade().ok_or_else(|| anyhow!("fade ended early"))?;
    assert_eq!(fade.source, FadeSource::Snapshot);
    let ratio = fade.elapsed / fade.duration;
    assert!((ratio - 0.2).abs() < 1e-5, "ratio {ratio}");

    // 0.05 s at the default speed of 4 is 0.2 frames into the new action.
    let (sample, _) = sample_frames(2, 4, 0.2, false, false);
    let mut target = Vec::new();
    compute_pose(&model, sample, 0.0, &mut target);
    for (index, bone) in harness.bones(id)?.iter().enumerate() {
        let expected = lerp_mat4(&snapshot[index], &target[index], ratio);
        assert!(bone.abs_diff_eq(expected, 1e-4), "bone {index}: {bone} vs {expected}");
    }
    Ok(())
}

#[test]
fn buffers_catch_up_once_a_fade_settles() -> Result<()> {
    let still = |x: f32| BoneKeyframeTrack::new(vec![Vec3::new(x, 0.0, 0.0); 2], vec![Quat::IDENTITY; 2]);
    let model = ModelBuilder::new("sentry")
        .action(2, 1.0)
        .action(2, 1.0)
        .bone("root", None, vec![still(0.0), still(10.0)])
        .quad(Some("skin.png"), 0, 10.0)
        .shared();
    let mut harness = Harness::new();
    let id = harness.spawn(&model)?;
    harness.tick(1.0 / 60.0);
    if let Some(object) = harness.world.get_mut(id) {
        object.current_action = 1;
    }
    for _ in 0..20 {
        harness.tick(1.0 / 60.0);
    }
    let object = harness.world.get(id).ok_or_else(|| anyhow!("sentry missing"))?;
    assert!(object.animator().cross_fade().is_none());
    assert!((harness.bones(id)?[0].w_axis.x - 10.0).abs() < 1e-4);
    let positions = harness.assert_buffer_matches_bones(id, &model)?;
    let min_x = positions.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    assert!((min_x - 5.0).abs() < 1e-4, "mesh min x {min_x}");
    Ok(())
}

#[test]
fn death_freeze_reaches_the_buffers_at_any_frame_rate() -> Result<()> {
    let model = ModelBuilder::new("fallen")
        .action(5, 1.0)
        .bone("root", None, vec![linear_track(5, Vec3::X, 1.0)])
        .quad(Some("skin.png"), 0, 10.0)
        .shared();
    for fps in [61.0f32, 75.0, 144.0] {
        let mut harness = Harness::new();
        let id = harness.world.spawn("fallen", ObjectClass::Monster);
        if let Some(object) = harness.world.get_mut(id) {
            object.death_actions.push(0);
        }
        pollster::block_on(harness.world.load_content(id, Some(model.clone()), &harness.assets, &harness.assets))?;
        for _ in 0..600 {
            harness.tick(1.0 / fps);
        }
        assert!((harness.bones(id)?[0].w_axis.x - 3.0).abs() < 1e-4);
        let positions = harness.assert_buffer_matches_bones(id, &model)?;
        let min_x = positions.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        assert!((min_x + 2.0).abs() < 1e-4, "fps {fps}: mesh min x {min_x}");
    }
    Ok(())
}

#[test]
fn death_action_freezes_on_second_to_last_frame() -> Result<()> {
    let model = ModelBuilder::new("fallen")
        .action(5, 1.0)
        .bone("root", None, vec![linear_track(5, Vec3::X, 1.0)])
        .quad(Some("skin.png"), 0, 10.0)
        .shared();
    let mut harness = Harness::new();
    let id = harness.world.spawn("fallen", ObjectClass::Monster);
    if let Some(object) = harness.world.get_mut(id) {
        object.death_actions.push(0);
    }
    pollster::block_on(harness.world.load_content(id, Some(model), &harness.assets, &harness.assets))?;
    for _ in 0..240 {
        harness.tick(1.0 / 60.0);
        let x = harness.bones(id)?[0].w_axis.x;
        assert!(x <= 3.0 + 1e-4, "death pose advanced to {x}");
    }
    assert!((harness.bones(id)?[0].w_axis.x - 3.0).abs() < 1e-4);
    Ok(())
}

#[test]
fn throttle_limits_rebuilds_unless_per_frame_is_required() -> Result<()> {
    let model = ModelBuilder::new("walker")
        .action(8, 1.0)
        .bone("root", None, vec![linear_track(8, Vec3::X, 2.0)])
        .quad(Some("skin.png"), 0, 10.0)
        .shared();
    let mut rebuilds = Vec::new();
    for per_frame in [false, true] {
        let mut harness = Harness::new();
        let id = harness.spawn(&model)?;
        if let Some(object) = harness.world.get_mut(id) {
            object.requires_per_frame_animation = per_frame;
            object.light_enabled = false;
        }
        for _ in 0..60 {
            harness.tick(1.0 / 60.0);
        }
        rebuilds.push(harness.world.stats().buffer_rebuilds);
    }
    assert_eq!(rebuilds[1], 60);
    assert!(rebuilds[0] < 25 && rebuilds[0] > 5, "throttled rebuilds: {}", rebuilds[0]);
    Ok(())
}
