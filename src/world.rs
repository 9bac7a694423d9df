//! Arena of model objects and the per-frame update and draw traversal.
//!
//! Parents are always processed before their children within a frame, so a child
//! reading its parent's bones or world matrix sees this frame's values.

use crate::assets::{AssetProvider, TextureProvider};
use crate::camera3d::CameraView;
use crate::config::EngineConfig;
use crate::dirty::DirtyFlags;
use crate::effects::{EffectKind, EffectRegistry};
use crate::environment::TerrainLighting;
use crate::model::ModelAsset;
use crate::object::{LoadState, MeshSlot, ModelObject, ObjectClass};
use crate::renderer::device::{BufferId, RenderDevice};
use crate::renderer::dispatch::{draw_object, DrawReport};
use crate::renderer::{BlendRegistry, DrawEnv, DrawPass};
use crate::skinning::{rebuild_buffers, release_buffers, BuildInputs, SkinnedVertex};
use crate::time::FrameTime;
use anyhow::{anyhow, bail, Result};
use glam::{Mat4, Vec3};
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

const STRIDE_OFFSET_MASK: u32 = 31;

/// Slot index plus the generation the slot had when the handle was issued. Handles to a
/// disposed object stop resolving once its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId {
    index: u32,
    generation: u32,
}

impl ModelId {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Counters accumulated across frames until [`ModelWorld::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub poses_generated: u64,
    pub pose_cache_hits: u64,
    pub buffer_rebuilds: u64,
    pub buffer_skips: u64,
    pub state_binds: u64,
    pub draw_calls: u64,
    pub draw_failures: u64,
    pub fallbacks: u64,
}

impl FrameStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn absorb(&mut self, report: DrawReport) {
        self.state_binds += report.state_binds as u64;
        self.draw_calls += report.draw_calls as u64;
        self.draw_failures += report.draw_failures as u64;
        self.fallbacks += report.fallbacks as u64;
    }
}

/// Collaborators shared by every object during one update or draw.
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    pub time: FrameTime,
    pub terrain: &'a dyn TerrainLighting,
    pub textures: &'a dyn TextureProvider,
}

pub struct ModelWorld {
    config: EngineConfig,
    blends: BlendRegistry,
    effects: EffectRegistry,
    objects: Vec<ModelObject>,
    generations: Vec<u32>,
    free: Vec<u32>,
    retired: Vec<BufferId>,
    scratch: Vec<SkinnedVertex>,
    stats: FrameStats,
    spawned: u32,
}

impl ModelWorld {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_effects(config, EffectRegistry::standard())
    }

    pub fn with_effects(config: EngineConfig, effects: EffectRegistry) -> Self {
        Self {
            config,
            blends: BlendRegistry::new(),
            effects,
            objects: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            retired: Vec::new(),
            scratch: Vec::new(),
            stats: FrameStats::default(),
            spawned: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn effects(&self) -> &EffectRegistry {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectRegistry {
        &mut self.effects
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Objects that have not been disposed.
    pub fn len(&self) -> usize {
        self.objects.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, live or awaiting reuse.
    pub fn capacity(&self) -> usize {
        self.objects.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = ModelId> + '_ {
        self.generations.iter().enumerate().map(|(index, &generation)| ModelId { index: index as u32, generation })
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.generations.get(id.index()) == Some(&id.generation)
    }

    pub fn get(&self, id: ModelId) -> Option<&ModelObject> {
        if !self.contains(id) {
            return None;
        }
        self.objects.get(id.index())
    }

    pub fn get_mut(&mut self, id: ModelId) -> Option<&mut ModelObject> {
        if !self.contains(id) {
            return None;
        }
        self.objects.get_mut(id.index())
    }

    /// Creates an object, reusing the slot of a disposed one when available.
    pub fn spawn(&mut self, name: impl Into<String>, class: ObjectClass) -> ModelId {
        let mut object = ModelObject::new(name, class);
        object.configure(&self.config);
        object.stride_offset = self.spawned & STRIDE_OFFSET_MASK;
        self.spawned = self.spawned.wrapping_add(1);
        let id = match self.free.pop() {
            Some(index) => {
                let slot = index as usize;
                self.generations[slot] = self.generations[slot].wrapping_add(1);
                self.objects[slot] = object;
                ModelId { index, generation: self.generations[slot] }
            }
            None => {
                let index = self.objects.len() as u32;
                self.objects.push(object);
                self.generations.push(0);
                ModelId { index, generation: 0 }
            }
        };
        log::debug!("[world] spawned {} as {id:?}", self.objects[id.index()].name);
        id
    }

    /// Places `child` under `parent`. The relation is fixed for the child's lifetime.
    pub fn attach_child(&mut self, parent: ModelId, child: ModelId) -> Result<()> {
        if parent == child {
            bail!("{parent:?} cannot parent itself");
        }
        let child_object = self.get(child).ok_or_else(|| anyhow!("unknown child {child:?}"))?;
        if let Some(existing) = child_object.parent {
            bail!("{child:?} already has parent {existing:?}");
        }
        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == child {
                bail!("attaching {child:?} under {parent:?} would form a cycle");
            }
            ancestor = self.get(current).ok_or_else(|| anyhow!("unknown parent {current:?}"))?.parent;
        }
        self.objects[parent.index()].children.push(child);
        self.objects[child.index()].parent = Some(parent);
        self.invalidate(child, DirtyFlags::TRANSFORM);
        Ok(())
    }

    /// Raises `flags` on `id` and, recursively, on its children. Children whose
    /// placement derives from the parent never receive TRANSFORM.
    pub fn invalidate(&mut self, id: ModelId, flags: DirtyFlags) {
        if !self.contains(id) {
            return;
        }
        let mut pending: SmallVec<[(ModelId, DirtyFlags); 8]> = smallvec![(id, flags)];
        while let Some((id, flags)) = pending.pop() {
            let Some(object) = self.objects.get_mut(id.index()) else {
                continue;
            };
            if object.state == LoadState::Disposed || flags.is_empty() {
                continue;
            }
            object.dirty |= flags;
            let children = object.children.clone();
            for child in children {
                let derives = self.objects[child.index()].derives_transform_from_parent();
                pending.push((child, flags.for_child(derives)));
            }
        }
    }

    pub fn set_color(&mut self, id: ModelId, color: Vec3) {
        if let Some(object) = self.get_mut(id) {
            object.color = color;
            self.invalidate(id, DirtyFlags::MATERIAL);
        }
    }

    pub fn set_blend_mesh_light(&mut self, id: ModelId, light: f32) {
        if let Some(object) = self.get_mut(id) {
            object.blend_mesh_light = light;
            self.invalidate(id, DirtyFlags::MATERIAL);
        }
    }

    /// Applies to `id` and every animation-linked descendant.
    pub fn set_render_shadow(&mut self, id: ModelId, enabled: bool) {
        if !self.contains(id) {
            return;
        }
        let mut pending: SmallVec<[ModelId; 8]> = smallvec![id];
        while let Some(current) = pending.pop() {
            let Some(object) = self.objects.get_mut(current.index()) else {
                continue;
            };
            object.render_shadow = enabled;
            let children = object.children.clone();
            pending.extend(children.into_iter().filter(|child| self.objects[child.index()].link_parent_animation));
        }
    }

    /// Fetches `key` through `assets` and loads it; a missing model leaves the object
    /// ready but with nothing to draw.
    pub async fn load_from(
        &mut self,
        id: ModelId,
        key: &str,
        assets: &dyn AssetProvider,
        textures: &dyn TextureProvider,
    ) -> Result<()> {
        let model = assets.model(key);
        if model.is_none() {
            log::debug!("[assets] no model for '{key}'; {id:?} stays empty");
        }
        self.load_content(id, model, assets, textures).await
    }

    /// Swaps the object's model. Re-assigning the loaded model is a no-op.
    pub async fn assign_model(
        &mut self,
        id: ModelId,
        model: Option<Arc<ModelAsset>>,
        assets: &dyn AssetProvider,
        textures: &dyn TextureProvider,
    ) -> Result<()> {
        if let Some(object) = self.get(id) {
            let same = match (&object.model, &model) {
                (Some(current), Some(next)) => Arc::ptr_eq(current, next),
                _ => false,
            };
            if same && object.is_ready() {
                return Ok(());
            }
        }
        self.load_content(id, model, assets, textures).await
    }

    /// Loads `model` into the object. Every mesh texture is prepared and awaited before
    /// the object becomes ready, so steady-state frames never block on texture loads.
    pub async fn load_content(
        &mut self,
        id: ModelId,
        model: Option<Arc<ModelAsset>>,
        assets: &dyn AssetProvider,
        textures: &dyn TextureProvider,
    ) -> Result<()> {
        let state = self.get(id).map(ModelObject::state).ok_or_else(|| anyhow!("unknown model object {id:?}"))?;
        if state == LoadState::Disposed {
            bail!("model object {id:?} is disposed");
        }
        let Some(model) = model else {
            self.clear_content(id);
            return Ok(());
        };
        for problem in model.validate() {
            log::warn!("[assets] {}: {problem}", model.name);
        }

        let paths: Vec<Option<String>> = model
            .meshes
            .iter()
            .map(|mesh| {
                mesh.texture_path
                    .as_deref()
                    .filter(|path| !path.is_empty())
                    .map(|path| assets.texture_path(&model, path))
            })
            .collect();
        let pending: Vec<_> = paths.iter().flatten().map(|path| (path, textures.prepare(path))).collect();
        for (path, prepare) in pending {
            if let Err(err) = prepare.await {
                log::warn!("[assets] {}: texture '{path}' failed to prepare: {err:?}", model.name);
            }
        }

        self.retire_buffers(id);
        let object = &mut self.objects[id.index()];
        object.meshes = paths
            .into_iter()
            .map(|texture_path| {
                let texture = texture_path.as_deref().and_then(|path| textures.texture(path));
                MeshSlot { texture_path, texture, cache: Default::default() }
            })
            .collect();
        object.animator.reset();
        object.light_probe.reset();
        object.bones.clear();
        let before = object.animator.pose_generations();
        object.animator.prime(&model, &mut object.bones, object.body_height);
        self.stats.poses_generated += object.animator.pose_generations() - before;
        object.bounds.clear();
        object.bounds.force(&model, &object.bones);
        log::debug!(
            "[assets] {} loaded '{}' ({} meshes, {} bones)",
            object.name,
            model.name,
            model.meshes.len(),
            model.bones.len()
        );
        object.model = Some(model);
        object.state = LoadState::Ready;
        self.invalidate(id, DirtyFlags::ALL);
        Ok(())
    }

    fn clear_content(&mut self, id: ModelId) {
        self.retire_buffers(id);
        let object = &mut self.objects[id.index()];
        object.model = None;
        object.meshes.clear();
        object.bones.clear();
        object.bounds.clear();
        object.animator.reset();
        object.dirty = DirtyFlags::empty();
        object.state = LoadState::Ready;
        log::debug!("[assets] {} has no model; nothing to draw", object.name);
    }

    fn retire_buffers(&mut self, id: ModelId) {
        let object = &mut self.objects[id.index()];
        for slot in &mut object.meshes {
            self.retired.extend(slot.cache.vertex_buffer.take());
            self.retired.extend(slot.cache.index_buffer.take());
        }
    }

    fn flush_retired(&mut self, device: &mut dyn RenderDevice) {
        for buffer in self.retired.drain(..) {
            device.release_buffer(buffer);
        }
    }

    /// Releases the object and its whole subtree. Later updates and draws skip them.
    pub fn dispose(&mut self, id: ModelId, device: &mut dyn RenderDevice) {
        let Some(parent) = self.get(id).map(|object| object.parent) else {
            return;
        };
        if let Some(parent) = parent {
            self.objects[parent.index()].children.retain(|child| *child != id);
        }
        let mut pending: SmallVec<[ModelId; 8]> = smallvec![id];
        while let Some(current) = pending.pop() {
            let object = &mut self.objects[current.index()];
            if object.state == LoadState::Disposed {
                continue;
            }
            release_buffers(object, device);
            object.meshes.clear();
            object.model = None;
            object.bones.clear();
            object.bounds.clear();
            object.animator.reset();
            object.dirty = DirtyFlags::empty();
            object.state = LoadState::Disposed;
            pending.extend(object.children.drain(..));
            log::debug!("[world] disposed {}", object.name);
            self.free.push(current.index);
        }
        self.flush_retired(device);
    }

    /// Advances every ready object: placement, animation, child sync, light checks and
    /// buffer rebuilds, parents first.
    pub fn update(&mut self, ctx: &FrameContext<'_>, device: &mut dyn RenderDevice) {
        self.flush_retired(device);
        let roots: Vec<ModelId> = self.ids().filter(|id| self.objects[id.index()].parent.is_none()).collect();
        for root in roots {
            self.update_object(root, ctx, device);
        }
    }

    fn update_object(&mut self, id: ModelId, ctx: &FrameContext<'_>, device: &mut dyn RenderDevice) {
        let index = id.index();
        if !self.objects[index].is_ready() {
            return;
        }
        self.place(id);
        if self.objects[index].visible {
            self.animate(id, &ctx.time);
            self.sync_children(id);
            self.check_light(id, ctx);
        }
        self.build(id, ctx, device);

        let children = self.objects[index].children.clone();
        for child in children {
            self.update_object(child, ctx, device);
        }
    }

    fn place(&mut self, id: ModelId) {
        let object = &self.objects[id.index()];
        let (parent_world, parent_angle, parent_scale) = match object.parent {
            Some(parent) => {
                let parent = &self.objects[parent.index()];
                let bone = object
                    .parent_bone_link
                    .map(|link| parent.bones.get(link).copied().unwrap_or(Mat4::IDENTITY))
                    .unwrap_or(Mat4::IDENTITY);
                (parent.world * bone, parent.total_angle, parent.total_scale)
            }
            None => (Mat4::IDENTITY, Vec3::ZERO, 1.0),
        };
        let world = parent_world * object.local_matrix();
        let object = &mut self.objects[id.index()];
        object.total_angle = parent_angle + object.angle;
        object.total_scale = parent_scale * object.scale;
        if world != object.world {
            object.world = world;
            self.invalidate(id, DirtyFlags::TRANSFORM);
        }
    }

    fn animate(&mut self, id: ModelId, time: &FrameTime) {
        let object = &mut self.objects[id.index()];
        if object.link_parent_animation {
            return;
        }
        let Some(model) = object.model.clone() else {
            return;
        };
        let input = object.animation_input(&self.config);
        let generations = object.animator.pose_generations();
        let hits = object.animator.pose_cache_hits();
        let flags = object.animator.tick(&model, &mut object.bones, &input, time);
        self.stats.poses_generated += object.animator.pose_generations() - generations;
        self.stats.pose_cache_hits += object.animator.pose_cache_hits() - hits;
        if !object.bones.is_empty() {
            object.bounds.update(&model, &object.bones);
        }
        self.invalidate(id, flags);
    }

    /// Bone-linked and animation-linked children follow the parent's clock.
    fn sync_children(&mut self, id: ModelId) {
        let children = self.objects[id.index()].children.clone();
        for child in children {
            let (parent, object) = pair_mut(&mut self.objects, id.index(), child.index());
            if object.parent_bone_link.is_none() && !object.link_parent_animation {
                continue;
            }
            object.current_action = parent.current_action;
            object.animator.follow(&parent.animator);
            if !parent.bones.is_empty() || parent.animator.cross_fade().is_some() {
                self.invalidate(child, DirtyFlags::ANIMATION);
            }
        }
    }

    fn cpu_lighting(&self) -> bool {
        !(self.config.shaders.dynamic_lighting && self.effects.has(EffectKind::DynamicLighting))
    }

    fn check_light(&mut self, id: ModelId, ctx: &FrameContext<'_>) {
        if !self.cpu_lighting() {
            return;
        }
        let lighting = &self.config.lighting;
        let object = &mut self.objects[id.index()];
        if object.link_parent_animation {
            return;
        }
        let current = base_light(object, ctx.terrain, true, lighting.light_sample_grid);
        let (interval, threshold) = if object.requires_per_frame_animation {
            (lighting.main_light_check_interval_ms, lighting.main_light_change_threshold)
        } else {
            (lighting.light_check_interval_ms, lighting.light_change_threshold)
        };
        if object.light_probe.check(current, ctx.time.total_ms, interval, threshold) {
            self.invalidate(id, DirtyFlags::LIGHTING);
        }
    }

    fn build(&mut self, id: ModelId, ctx: &FrameContext<'_>, device: &mut dyn RenderDevice) {
        let cpu = self.cpu_lighting();
        let grid = self.config.lighting.light_sample_grid;
        let index = id.index();
        let shared_parent = {
            let object = &self.objects[index];
            object.parent.filter(|_| object.link_parent_animation)
        };
        let report = match shared_parent {
            Some(parent) => {
                let (parent, object) = pair_mut(&mut self.objects, parent.index(), index);
                let inputs = BuildInputs {
                    shared_bones: Some(parent.bones.as_slice()),
                    base_light: base_light(object, ctx.terrain, cpu, grid),
                    frame_index: ctx.time.frame_index,
                };
                rebuild_buffers(object, inputs, ctx.textures, device, &mut self.scratch)
            }
            None => {
                let object = &mut self.objects[index];
                let inputs = BuildInputs {
                    shared_bones: None,
                    base_light: base_light(object, ctx.terrain, cpu, grid),
                    frame_index: ctx.time.frame_index,
                };
                rebuild_buffers(object, inputs, ctx.textures, device, &mut self.scratch)
            }
        };
        self.stats.buffer_rebuilds += report.rebuilt as u64;
        self.stats.buffer_skips += report.skipped as u64;
    }

    /// Draws every object for `pass`, parents before children.
    pub fn draw(
        &mut self,
        pass: DrawPass,
        ctx: &FrameContext<'_>,
        camera: &dyn CameraView,
        device: &mut dyn RenderDevice,
    ) -> DrawReport {
        let env = DrawEnv {
            config: &self.config,
            blends: &self.blends,
            effects: &self.effects,
            camera,
            terrain: ctx.terrain,
            time: ctx.time,
        };
        let mut report = DrawReport::default();
        for id in self.tree_order() {
            report.merge(draw_object(&self.objects[id.index()], pass, &env, device));
        }
        self.stats.absorb(report);
        report
    }

    fn tree_order(&self) -> Vec<ModelId> {
        let mut order = Vec::with_capacity(self.objects.len());
        let mut pending: Vec<ModelId> =
            self.ids().filter(|id| self.objects[id.index()].parent.is_none()).collect();
        pending.reverse();
        while let Some(id) = pending.pop() {
            order.push(id);
            pending.extend(self.objects[id.index()].children.iter().rev().copied());
        }
        order
    }
}

/// Terrain (grid-sampled on the CPU path) plus own light, or just own light when
/// terrain lighting is off for the object.
fn base_light(object: &mut ModelObject, terrain: &dyn TerrainLighting, cpu: bool, grid: f32) -> Vec3 {
    if !object.light_enabled {
        return object.light;
    }
    let at = object.world.w_axis.truncate();
    let terrain_light =
        if cpu { object.light_probe.sample(terrain, at, grid) } else { terrain.terrain_light(at.x, at.y) };
    terrain_light + object.light
}

fn pair_mut(objects: &mut [ModelObject], parent: usize, child: usize) -> (&ModelObject, &mut ModelObject) {
    if parent < child {
        let (head, tail) = objects.split_at_mut(child);
        (&head[parent], &mut tail[0])
    } else {
        let (head, tail) = objects.split_at_mut(parent);
        (&tail[0], &mut head[child])
    }
}
