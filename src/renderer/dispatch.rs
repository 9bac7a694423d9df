use super::device::{DepthMode, DrawCall, PipelineState, RasterState, RenderDevice};
use super::grouping::{group_meshes, MeshGroup};
use super::overlay::{draw_highlight, draw_shadow, highlight_matrix, shadow_matrix};
use super::{DrawEnv, DrawPass};
use crate::config::ShaderConfig;
use crate::effects::{EffectKind, EffectParams, ParamValue};
use crate::object::ModelObject;
use anyhow::{anyhow, Result};
use glam::{Mat4, Vec3};
use serde::Serialize;
use smallvec::SmallVec;

/// How one mesh is drawn. Computed once per mesh per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    FastAlpha,
    DynamicLighting,
    ItemMaterial,
    MonsterMaterial,
}

impl RenderPath {
    pub fn effect(self) -> EffectKind {
        match self {
            RenderPath::FastAlpha => EffectKind::AlphaTest,
            RenderPath::DynamicLighting => EffectKind::DynamicLighting,
            RenderPath::ItemMaterial => EffectKind::ItemMaterial,
            RenderPath::MonsterMaterial => EffectKind::MonsterMaterial,
        }
    }
}

/// Item material beats monster material, which beats dynamic lighting. Dead entities
/// always take the fast path.
pub fn classify_path(object: &ModelObject, mesh: usize, shaders: &ShaderConfig) -> RenderPath {
    if object.dead {
        RenderPath::FastAlpha
    } else if shaders.item_material && object.uses_item_material(mesh) {
        RenderPath::ItemMaterial
    } else if shaders.monster_material && object.glow.custom_shader {
        RenderPath::MonsterMaterial
    } else if shaders.dynamic_lighting {
        RenderPath::DynamicLighting
    } else {
        RenderPath::FastAlpha
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrawReport {
    pub state_binds: u32,
    pub draw_calls: u32,
    pub draw_failures: u32,
    pub fallbacks: u32,
}

impl DrawReport {
    pub fn merge(&mut self, other: DrawReport) {
        self.state_binds += other.state_binds;
        self.draw_calls += other.draw_calls;
        self.draw_failures += other.draw_failures;
        self.fallbacks += other.fallbacks;
    }
}

/// Per-pass shared values so every mesh does not recompute them.
struct PassFrame {
    world: Mat4,
    view: Mat4,
    projection: Mat4,
    eye: Vec3,
    alpha: f32,
}

/// Draws one object's meshes for `pass`. Failures are logged and counted; they never
/// stop the remaining meshes or groups.
pub fn draw_object(
    object: &ModelObject,
    pass: DrawPass,
    env: &DrawEnv<'_>,
    device: &mut dyn RenderDevice,
) -> DrawReport {
    let mut report = DrawReport::default();
    if !object.is_ready() || !object.visible || object.out_of_view {
        return report;
    }
    let groups = group_meshes(object, pass, env.blends);
    if groups.is_empty() {
        return report;
    }

    let frame = PassFrame {
        world: object.world,
        view: env.camera.view(),
        projection: env.camera.projection(),
        eye: env.camera.eye_position(),
        alpha: object.alpha,
    };
    let solid = pass == DrawPass::Solid;
    let shadow = if solid && object.render_shadow && env.config.render.shadows_enabled && !object.low_quality {
        shadow_matrix(object, env.terrain)
    } else {
        None
    };
    let highlight = (solid && object.mouse_hover && !object.dead && !object.low_quality)
        .then(|| highlight_matrix(frame.world, env.config.render.highlight_scale));
    let depth_bias = object.effective_depth_bias(&env.config.render.depth_bias);

    for group in &groups {
        if let Some(shadow) = shadow {
            draw_shadow(object, group, shadow, env, device, &mut report);
        }
        if let Some(highlight) = highlight {
            draw_highlight(object, group, highlight, env, device, &mut report);
        }

        let state = PipelineState {
            blend: group.key.blend,
            raster: RasterState::sided(group.key.two_sided, depth_bias),
            depth: DepthMode::ReadWrite,
        };
        if let Err(err) = device.bind_state(&state) {
            log::warn!("[render] {}: group state rejected: {err:?}", object.name);
            report.draw_failures += group.meshes.len() as u32;
            continue;
        }
        report.state_binds += 1;
        draw_group(object, group, &frame, env, device, &mut report);
    }
    report
}

fn draw_group(
    object: &ModelObject,
    group: &MeshGroup,
    frame: &PassFrame,
    env: &DrawEnv<'_>,
    device: &mut dyn RenderDevice,
    report: &mut DrawReport,
) {
    // The alpha-test effect carries the group texture, so it is bound at most once per group.
    let mut base_bound = false;
    for &mesh in &group.meshes {
        let Some(draw) = draw_call(object, group, mesh) else {
            continue;
        };
        let path = classify_path(object, mesh, &env.config.shaders);
        if path != RenderPath::FastAlpha {
            let kind = path.effect();
            match env.effects.params(kind) {
                Some(params) => {
                    base_bound = false;
                    match draw_special(object, path, params, &draw, frame, env, device) {
                        Ok(()) => report.draw_calls += 1,
                        Err(err) => {
                            log::debug!(
                                "[render] {}: {} draw failed for mesh {mesh}: {err:?}",
                                object.name,
                                kind.label()
                            );
                            report.draw_failures += 1;
                        }
                    }
                    continue;
                }
                None => {
                    log::debug!(
                        "[render] {}: {} effect unavailable for mesh {mesh}, using standard path",
                        object.name,
                        kind.label()
                    );
                    report.fallbacks += 1;
                }
            }
        }

        if !base_bound {
            let bound = bind_base(group, frame, env, device);
            if let Err(err) = bound {
                log::debug!("[render] {}: alpha-test effect rejected: {err:?}", object.name);
                report.draw_failures += 1;
                continue;
            }
            base_bound = true;
        }
        match device.draw_indexed(&draw) {
            Ok(()) => report.draw_calls += 1,
            Err(err) => {
                log::debug!("[render] {}: draw failed for mesh {mesh}: {err:?}", object.name);
                report.draw_failures += 1;
            }
        }
    }
}

fn draw_call(object: &ModelObject, group: &MeshGroup, mesh: usize) -> Option<DrawCall> {
    let cache = &object.meshes.get(mesh)?.cache;
    let (vertex_buffer, index_buffer) = cache.buffers()?;
    Some(DrawCall { vertex_buffer, index_buffer, index_count: cache.index_count, texture: group.key.texture })
}

fn bind_base(group: &MeshGroup, frame: &PassFrame, env: &DrawEnv<'_>, device: &mut dyn RenderDevice) -> Result<()> {
    let mut params = env
        .effects
        .params(EffectKind::AlphaTest)
        .ok_or_else(|| anyhow!("alpha-test effect missing"))?;
    params
        .set("World", ParamValue::Matrix(frame.world))
        .set("View", ParamValue::Matrix(frame.view))
        .set("Projection", ParamValue::Matrix(frame.projection))
        .set("Texture", ParamValue::Texture(group.key.texture))
        .set("DiffuseColor", ParamValue::Vec3(Vec3::ONE))
        .set("Alpha", ParamValue::Float(frame.alpha));
    device.bind_effect(&params)
}

fn draw_special(
    object: &ModelObject,
    path: RenderPath,
    mut params: EffectParams<'_>,
    draw: &DrawCall,
    frame: &PassFrame,
    env: &DrawEnv<'_>,
    device: &mut dyn RenderDevice,
) -> Result<()> {
    let texture = ParamValue::Texture(draw.texture);
    let time = ParamValue::Float(env.time.total_seconds());
    params
        .set("World", ParamValue::Matrix(frame.world))
        .set("View", ParamValue::Matrix(frame.view))
        .set("Projection", ParamValue::Matrix(frame.projection))
        .set("EyePosition", ParamValue::Vec3(frame.eye))
        .set("Alpha", ParamValue::Float(frame.alpha));
    match path {
        RenderPath::DynamicLighting => {
            params
                .set("WorldViewProjection", ParamValue::Matrix(frame.projection * frame.view * frame.world))
                .set("DiffuseTexture", texture);
            lighting_params(object, frame, env, &mut params);
        }
        RenderPath::ItemMaterial => {
            params
                .set("WorldViewProjection", ParamValue::Matrix(frame.projection * frame.view * frame.world))
                .set("DiffuseTexture", texture)
                .set("ItemOptions", ParamValue::Int(object.item.option_word()))
                .set("Time", time)
                .set("IsAncient", ParamValue::Bool(object.item.ancient))
                .set("IsExcellent", ParamValue::Bool(object.item.excellent));
        }
        RenderPath::MonsterMaterial => {
            params
                .set("DiffuseTexture", texture)
                .set("GlowColor", ParamValue::Vec3(object.glow.color))
                .set("GlowIntensity", ParamValue::Float(object.glow.intensity))
                .set("EnableGlow", ParamValue::Bool(object.glow.intensity > 0.0))
                .set("Time", time);
        }
        RenderPath::FastAlpha => {}
    }
    device.bind_effect(&params)?;
    device.draw_indexed(draw)
}

fn lighting_params(object: &ModelObject, frame: &PassFrame, env: &DrawEnv<'_>, params: &mut EffectParams<'_>) {
    let shaders = &env.config.shaders;
    let position = frame.world.w_axis.truncate();
    let terrain_light = if object.light_enabled {
        (env.terrain.terrain_light(position.x, position.y) / 255.0).clamp(Vec3::ZERO, Vec3::ONE)
    } else {
        Vec3::ONE
    };
    let budget = shaders.light_budget();
    let lights = env.terrain.active_lights();
    let active = &lights[..lights.len().min(budget)];
    params
        .set("AmbientLight", ParamValue::Vec3(Vec3::from_array(env.config.lighting.dynamic_ambient)))
        .set("TerrainLight", ParamValue::Vec3(terrain_light))
        .set("ActiveLightCount", ParamValue::Int(active.len() as i32))
        .set("MaxLightsToProcess", ParamValue::Int(budget as i32))
        .set("DebugLightingAreas", ParamValue::Bool(shaders.debug_lighting_areas));
    if !active.is_empty() {
        params
            .set("LightPositions", ParamValue::Vec3Array(active.iter().map(|l| l.position).collect::<SmallVec<_>>()))
            .set("LightColors", ParamValue::Vec3Array(active.iter().map(|l| l.color).collect::<SmallVec<_>>()))
            .set("LightRadii", ParamValue::FloatArray(active.iter().map(|l| l.radius).collect::<SmallVec<_>>()))
            .set(
                "LightIntensities",
                ParamValue::FloatArray(active.iter().map(|l| l.intensity).collect::<SmallVec<_>>()),
            );
    }
}
