//! Parsed model data as handed over by the asset layer.
//!
//! Bones are stored parent-first: a bone's parent index must be lower than its own
//! index so a single forward pass can compose world matrices. [`ModelAsset::validate`]
//! reports bones that break the rule; pose generation treats them as roots.

use glam::{Quat, Vec2, Vec3};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct BoneKeyframeTrack {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Quat>,
}

impl BoneKeyframeTrack {
    pub fn new(positions: Vec<Vec3>, rotations: Vec<Quat>) -> Self {
        Self { positions, rotations }
    }

    /// Number of usable samples; positions and rotations may disagree in length.
    pub fn sample_count(&self) -> usize {
        self.positions.len().min(self.rotations.len())
    }

    pub fn is_valid(&self) -> bool {
        self.sample_count() > 0
    }
}

#[derive(Debug, Clone)]
pub struct Bone {
    pub name: Arc<str>,
    pub parent: Option<u32>,
    /// One track per action, indexed by action. Missing or empty tracks produce identity.
    pub tracks: Vec<BoneKeyframeTrack>,
}

impl Bone {
    pub fn track(&self, action: usize) -> Option<&BoneKeyframeTrack> {
        self.tracks.get(action).filter(|track| track.is_valid())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Action {
    pub frame_count: u32,
    pub play_speed: f32,
    pub lock_positions: bool,
}

impl Action {
    pub fn new(frame_count: u32, play_speed: f32) -> Self {
        Self { frame_count, play_speed, lock_positions: false }
    }

    /// Play speed used by the driver; a zero speed means "unscaled".
    pub fn effective_speed(&self) -> f32 {
        if self.play_speed == 0.0 {
            1.0
        } else {
            self.play_speed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub bone: u16,
}

impl ModelVertex {
    pub fn new(position: Vec3, bone: u16) -> Self {
        Self { position, normal: Vec3::Z, uv: Vec2::ZERO, bone }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshAsset {
    pub texture_path: Option<String>,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    /// Named blend mode from the model file; `None` or "Opaque" means the default state.
    pub blending_mode: Option<String>,
}

impl MeshAsset {
    pub fn has_custom_blend(&self) -> bool {
        matches!(self.blending_mode.as_deref(), Some(name) if !name.is_empty() && name != "Opaque")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelAsset {
    pub name: Arc<str>,
    pub bones: Vec<Bone>,
    pub meshes: Vec<MeshAsset>,
    pub actions: Vec<Action>,
}

impl ModelAsset {
    /// Parent index usable for composition, or `None` for roots and out-of-order parents.
    pub fn parent_of(&self, bone: usize) -> Option<usize> {
        let parent = self.bones.get(bone)?.parent? as usize;
        (parent < bone).then_some(parent)
    }

    /// Lists structural problems. An empty list means the model is safe to animate as-is.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (index, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent as usize >= index {
                    problems.push(format!(
                        "bone {index} '{}' has parent {parent} which is not processed before it",
                        bone.name
                    ));
                }
            }
        }
        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            if let Some(vertex) = mesh.vertices.iter().find(|v| v.bone as usize >= self.bones.len()) {
                problems.push(format!(
                    "mesh {mesh_index} references bone {} but the model has {} bones",
                    vertex.bone,
                    self.bones.len()
                ));
            }
            if mesh.indices.iter().any(|&i| i as usize >= mesh.vertices.len()) {
                problems.push(format!("mesh {mesh_index} has indices past its vertex count"));
            }
        }
        problems
    }
}

/// Procedural model construction for tools and tests.
pub struct ModelBuilder {
    asset: ModelAsset,
}

impl ModelBuilder {
    pub fn new(name: &str) -> Self {
        Self { asset: ModelAsset { name: Arc::from(name), ..Default::default() } }
    }

    pub fn action(mut self, frame_count: u32, play_speed: f32) -> Self {
        self.asset.actions.push(Action::new(frame_count, play_speed));
        self
    }

    pub fn locked_action(mut self, frame_count: u32, play_speed: f32) -> Self {
        self.asset.actions.push(Action { frame_count, play_speed, lock_positions: true });
        self
    }

    /// Adds a bone; `tracks[a]` is the keyframe track for action `a`.
    pub fn bone(mut self, name: &str, parent: Option<u32>, tracks: Vec<BoneKeyframeTrack>) -> Self {
        self.asset.bones.push(Bone { name: Arc::from(name), parent, tracks });
        self
    }

    /// Adds a quad of four vertices bound to `bone`, two triangles.
    pub fn quad(mut self, texture: Option<&str>, bone: u16, size: f32) -> Self {
        let h = size * 0.5;
        let corners = [Vec3::new(-h, -h, 0.0), Vec3::new(h, -h, 0.0), Vec3::new(h, h, 0.0), Vec3::new(-h, h, 0.0)];
        let uvs = [Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.0)];
        let vertices = corners
            .iter()
            .zip(uvs)
            .map(|(&position, uv)| ModelVertex { position, normal: Vec3::Z, uv, bone })
            .collect();
        self.asset.meshes.push(MeshAsset {
            texture_path: texture.map(str::to_string),
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
            blending_mode: None,
        });
        self
    }

    pub fn mesh(mut self, mesh: MeshAsset) -> Self {
        self.asset.meshes.push(mesh);
        self
    }

    pub fn blend_mode(mut self, mesh: usize, mode: &str) -> Self {
        if let Some(target) = self.asset.meshes.get_mut(mesh) {
            target.blending_mode = Some(mode.to_string());
        }
        self
    }

    pub fn build(self) -> ModelAsset {
        self.asset
    }

    pub fn shared(self) -> Arc<ModelAsset> {
        Arc::new(self.asset)
    }
}

/// Track holding `frames` samples that translate along `axis` by `step` per frame.
pub fn linear_track(frames: usize, axis: Vec3, step: f32) -> BoneKeyframeTrack {
    let positions = (0..frames).map(|i| axis * (i as f32 * step)).collect();
    let rotations = vec![Quat::IDENTITY; frames];
    BoneKeyframeTrack::new(positions, rotations)
}

/// Track rotating about Z by `step_radians` per frame at a fixed offset.
pub fn spin_track(frames: usize, offset: Vec3, step_radians: f32) -> BoneKeyframeTrack {
    let positions = vec![offset; frames];
    let rotations = (0..frames).map(|i| Quat::from_rotation_z(i as f32 * step_radians)).collect();
    BoneKeyframeTrack::new(positions, rotations)
}
