use crate::animation::{AnimationInput, Animator};
use crate::assets::TextureInfo;
use crate::bounds::BoundsUpdater;
use crate::config::{DepthBiasConfig, EngineConfig};
use crate::dirty::DirtyFlags;
use crate::environment::LightProbe;
use crate::model::ModelAsset;
use crate::renderer::blend::BlendId;
use crate::skinning::MeshBufferCache;
use crate::world::ModelId;
use glam::{EulerRot, Mat4, Quat, Vec3};
use smallvec::SmallVec;
use std::sync::Arc;

/// Coarse entity category; picks default depth bias and highlight colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectClass {
    Player,
    Npc,
    Monster,
    DroppedItem,
    #[default]
    Other,
}

impl ObjectClass {
    pub fn depth_bias(self, config: &DepthBiasConfig) -> f32 {
        match self {
            ObjectClass::Player => config.player,
            ObjectClass::Npc => config.npc,
            ObjectClass::DroppedItem => config.dropped_item,
            ObjectClass::Monster | ObjectClass::Other => config.other,
        }
    }

    pub fn hostile(self) -> bool {
        matches!(self, ObjectClass::Monster)
    }
}

/// Picks none, one or every mesh of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshSelector {
    #[default]
    None,
    Index(usize),
    All,
}

impl MeshSelector {
    pub fn selects(self, mesh: usize) -> bool {
        match self {
            MeshSelector::None => false,
            MeshSelector::Index(index) => index == mesh,
            MeshSelector::All => true,
        }
    }

    /// Decodes the legacy integer form: -1 none, -2 all, otherwise an index.
    pub fn from_legacy(value: i32) -> Self {
        match value {
            -2 => MeshSelector::All,
            v if v >= 0 => MeshSelector::Index(v as usize),
            _ => MeshSelector::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Pending,
    Ready,
    Disposed,
}

/// Per-mesh texture binding plus the cached GPU buffers.
#[derive(Debug, Clone, Default)]
pub struct MeshSlot {
    pub texture_path: Option<String>,
    pub texture: Option<TextureInfo>,
    pub cache: MeshBufferCache,
}

impl MeshSlot {
    pub fn has_alpha(&self) -> bool {
        self.texture.is_some_and(|t| t.has_alpha)
    }

    pub fn hidden_by_script(&self) -> bool {
        self.texture.is_some_and(|t| t.hidden)
    }

    pub fn bright(&self) -> bool {
        self.texture.is_some_and(|t| t.bright)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemAppearance {
    pub level: u8,
    pub excellent: bool,
    pub ancient: bool,
}

impl ItemAppearance {
    pub fn wants_material(&self) -> bool {
        self.level >= 7 || self.excellent || self.ancient
    }

    /// Packed option word read by the item material shader.
    pub fn option_word(&self) -> i32 {
        let mut options = (self.level & 0x0F) as i32;
        if self.excellent {
            options |= 0x10;
        }
        options
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glow {
    pub color: Vec3,
    pub intensity: f32,
    pub custom_shader: bool,
}

impl Default for Glow {
    fn default() -> Self {
        Self { color: Vec3::new(1.0, 0.8, 0.0), intensity: 0.0, custom_shader: false }
    }
}

/// One renderable, animatable entity living in a [`crate::ModelWorld`].
pub struct ModelObject {
    pub name: String,
    pub class: ObjectClass,

    pub position: Vec3,
    /// Euler angles in radians.
    pub angle: Vec3,
    pub scale: f32,
    pub(crate) world: Mat4,
    pub(crate) total_angle: Vec3,
    pub(crate) total_scale: f32,

    pub(crate) parent: Option<ModelId>,
    pub(crate) children: Vec<ModelId>,
    pub parent_bone_link: Option<usize>,
    pub link_parent_animation: bool,

    pub(crate) model: Option<Arc<ModelAsset>>,
    pub(crate) meshes: Vec<MeshSlot>,
    pub(crate) bones: Vec<Mat4>,
    pub(crate) animator: Animator,
    pub(crate) bounds: BoundsUpdater,
    pub(crate) light_probe: LightProbe,
    pub(crate) dirty: DirtyFlags,
    pub(crate) state: LoadState,

    pub current_action: usize,
    pub animation_speed: f32,
    pub continuous_animation: bool,
    pub prevent_last_frame_interpolation: bool,
    pub requires_per_frame_animation: bool,
    pub death_actions: SmallVec<[usize; 4]>,
    pub body_height: f32,

    pub visible: bool,
    pub out_of_view: bool,
    pub low_quality: bool,
    pub mouse_hover: bool,
    pub dead: bool,
    pub(crate) render_shadow: bool,

    pub hidden_mesh: MeshSelector,
    pub blend_mesh: MeshSelector,
    pub blend_mesh_state: Option<BlendId>,
    pub(crate) blend_mesh_light: f32,
    pub item_material_exclusions: SmallVec<[usize; 4]>,

    pub(crate) color: Vec3,
    pub alpha: f32,
    pub light: Vec3,
    pub light_enabled: bool,
    pub shadow_opacity: f32,
    pub item: ItemAppearance,
    pub glow: Glow,
    pub depth_bias: Option<f32>,
    pub hostile: Option<bool>,

    pub(crate) animation_update_stride: u32,
    pub(crate) stride_offset: u32,
}

impl ModelObject {
    pub fn new(name: impl Into<String>, class: ObjectClass) -> Self {
        Self {
            name: name.into(),
            class,
            position: Vec3::ZERO,
            angle: Vec3::ZERO,
            scale: 1.0,
            world: Mat4::IDENTITY,
            total_angle: Vec3::ZERO,
            total_scale: 1.0,
            parent: None,
            children: Vec::new(),
            parent_bone_link: None,
            link_parent_animation: false,
            model: None,
            meshes: Vec::new(),
            bones: Vec::new(),
            animator: Animator::new(),
            bounds: BoundsUpdater::default(),
            light_probe: LightProbe::default(),
            dirty: DirtyFlags::ALL,
            state: LoadState::Pending,
            current_action: 0,
            animation_speed: 4.0,
            continuous_animation: false,
            prevent_last_frame_interpolation: false,
            requires_per_frame_animation: false,
            death_actions: SmallVec::new(),
            body_height: 0.0,
            visible: true,
            out_of_view: false,
            low_quality: false,
            mouse_hover: false,
            dead: false,
            render_shadow: false,
            hidden_mesh: MeshSelector::None,
            blend_mesh: MeshSelector::None,
            blend_mesh_state: None,
            blend_mesh_light: 1.0,
            item_material_exclusions: SmallVec::new(),
            color: Vec3::ONE,
            alpha: 1.0,
            light: Vec3::ZERO,
            light_enabled: true,
            shadow_opacity: 1.0,
            item: ItemAppearance::default(),
            glow: Glow::default(),
            depth_bias: None,
            hostile: None,
            animation_update_stride: 1,
            stride_offset: 0,
        }
    }

    /// Applies engine-wide tuning; called by the world at spawn.
    pub(crate) fn configure(&mut self, config: &EngineConfig) {
        self.animation_speed = config.animation.default_speed;
        self.bounds = BoundsUpdater::new(config.bounds.update_interval, config.bounds.max_samples_per_mesh);
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    pub fn model(&self) -> Option<&Arc<ModelAsset>> {
        self.model.as_ref()
    }

    pub fn parent(&self) -> Option<ModelId> {
        self.parent
    }

    pub fn children(&self) -> &[ModelId] {
        &self.children
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    pub fn bone_transforms(&self) -> &[Mat4] {
        &self.bones
    }

    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn blend_mesh_light(&self) -> f32 {
        self.blend_mesh_light
    }

    pub fn render_shadow(&self) -> bool {
        self.render_shadow
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    pub fn mesh_slots(&self) -> &[MeshSlot] {
        &self.meshes
    }

    pub fn local_bounds(&self) -> Option<crate::bounds::Aabb> {
        self.bounds.local()
    }

    pub fn animation_update_stride(&self) -> u32 {
        self.animation_update_stride
    }

    pub fn stride_offset(&self) -> u32 {
        self.stride_offset
    }

    pub fn set_animation_update_stride(&mut self, stride: u32) {
        self.animation_update_stride = stride.max(1);
    }

    pub fn derives_transform_from_parent(&self) -> bool {
        self.link_parent_animation || self.parent_bone_link.is_some()
    }

    pub fn effective_depth_bias(&self, config: &DepthBiasConfig) -> f32 {
        self.depth_bias.unwrap_or_else(|| self.class.depth_bias(config))
    }

    pub fn is_hostile(&self) -> bool {
        self.hostile.unwrap_or_else(|| self.class.hostile())
    }

    pub fn is_death_action(&self, action: usize) -> bool {
        self.death_actions.contains(&action)
    }

    /// Meshes outside the loaded range are never hidden; they are simply not drawn.
    pub fn is_hidden_mesh(&self, mesh: usize) -> bool {
        let Some(slot) = self.meshes.get(mesh) else {
            return false;
        };
        self.hidden_mesh.selects(mesh) || slot.hidden_by_script()
    }

    pub fn is_blend_mesh(&self, mesh: usize) -> bool {
        let Some(slot) = self.meshes.get(mesh) else {
            return false;
        };
        self.blend_mesh.selects(mesh) || slot.bright()
    }

    pub fn is_two_sided(&self, mesh: usize) -> bool {
        let custom = self.model.as_ref().and_then(|m| m.meshes.get(mesh)).is_some_and(|m| m.has_custom_blend());
        self.meshes.get(mesh).is_some_and(MeshSlot::has_alpha) || self.is_blend_mesh(mesh) || custom
    }

    pub fn uses_item_material(&self, mesh: usize) -> bool {
        self.item.wants_material() && !self.item_material_exclusions.contains(&mesh)
    }

    pub(crate) fn local_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(EulerRot::XYZ, self.angle.x, self.angle.y, self.angle.z);
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), rotation, self.position)
    }

    pub(crate) fn animation_input(&self, config: &EngineConfig) -> AnimationInput {
        AnimationInput {
            action: self.current_action,
            speed: self.animation_speed,
            continuous: self.continuous_animation,
            prevent_last_frame_interpolation: self.prevent_last_frame_interpolation,
            death_pose: self.is_death_action(self.current_action),
            requires_per_frame: self.requires_per_frame_animation,
            link_parent_animation: self.link_parent_animation,
            bone_linked: self.parent_bone_link.is_some(),
            body_height: self.body_height,
            blend_duration: config.animation.blend_duration,
            throttle_interval_ms: config.animation.throttle_interval_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_selector_values() {
        assert_eq!(MeshSelector::from_legacy(-1), MeshSelector::None);
        assert_eq!(MeshSelector::from_legacy(-2), MeshSelector::All);
        assert_eq!(MeshSelector::from_legacy(3), MeshSelector::Index(3));
        assert!(MeshSelector::All.selects(7));
        assert!(!MeshSelector::Index(1).selects(0));
    }

    #[test]
    fn item_option_word_packs_level_and_excellent() {
        let item = ItemAppearance { level: 11, excellent: true, ancient: false };
        assert_eq!(item.option_word(), 0x1B);
        assert!(item.wants_material());
        assert!(!ItemAppearance { level: 6, ..Default::default() }.wants_material());
    }

    #[test]
    fn class_depth_bias_orders_players_items_npcs() {
        let config = DepthBiasConfig::default();
        let player = ObjectClass::Player.depth_bias(&config);
        let item = ObjectClass::DroppedItem.depth_bias(&config);
        let npc = ObjectClass::Npc.depth_bias(&config);
        assert!(item < player && player < npc && npc < 0.0);
        assert_eq!(ObjectClass::Other.depth_bias(&config), 0.0);
    }

    #[test]
    fn explicit_overrides_beat_class_defaults() {
        let mut object = ModelObject::new("guard", ObjectClass::Npc);
        assert!(!object.is_hostile());
        object.hostile = Some(true);
        object.depth_bias = Some(-1.0);
        assert!(object.is_hostile());
        assert_eq!(object.effective_depth_bias(&DepthBiasConfig::default()), -1.0);
    }
}
