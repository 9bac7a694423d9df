use super::device::{DepthMode, DrawCall, PipelineState, RasterState, RenderDevice};
use super::dispatch::DrawReport;
use super::grouping::MeshGroup;
use super::blend::BlendId;
use super::DrawEnv;
use crate::effects::{EffectKind, ParamValue};
use crate::environment::TerrainLighting;
use crate::mat4_is_finite;
use crate::object::ModelObject;
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use std::f32::consts::FRAC_PI_2;

const SHADOW_SAMPLE_ANGLE: f32 = std::f32::consts::FRAC_PI_4;
const SHADOW_LIFT: f32 = 0.1;

/// Flattened, ground-projected world matrix for the object's drop shadow.
///
/// Returns `None` when the object's world matrix or the result is not finite.
pub fn shadow_matrix(object: &ModelObject, terrain: &dyn TerrainLighting) -> Option<Mat4> {
    if !mat4_is_finite(&object.world) {
        return None;
    }
    let position = object.world.w_axis.truncate();
    let terrain_height = terrain.terrain_height(position.x, position.y) * 1.5;
    let above = position.z - terrain_height;
    let sample_distance = above + 10.0;
    let offset = sample_distance * Vec3::new(SHADOW_SAMPLE_ANGLE.cos(), SHADOW_SAMPLE_ANGLE.sin(), 0.0);
    let behind = terrain.terrain_height(position.x - offset.x, position.y - offset.y);
    let ahead = terrain.terrain_height(position.x + offset.x, position.y + offset.y);
    let slope = (ahead - behind).atan2(sample_distance * 0.4);

    let shadow_position =
        Vec3::new(position.x - above / 2.0, position.y - above / 4.5, terrain_height + 1.0 + SHADOW_LIFT);
    let angle = object.total_angle;
    let yaw = angle.y + 110f32.to_radians() - slope / 2.0;
    let pitch = angle.x + 120f32.to_radians();
    let roll = angle.z + 90f32.to_radians();
    let rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll);
    let scale = object.total_scale;

    let matrix = Mat4::from_translation(shadow_position)
        * Mat4::from_rotation_z(SHADOW_SAMPLE_ANGLE)
        * Mat4::from_rotation_x((-FRAC_PI_2 - slope).max(-FRAC_PI_2))
        * Mat4::from_scale(Vec3::new(scale, 0.01 * scale, scale))
        * Mat4::from_quat(rotation);
    mat4_is_finite(&matrix).then_some(matrix)
}

/// Silhouette matrix: the object scaled up by `1 + scale` around a slightly shifted origin.
pub fn highlight_matrix(world: Mat4, scale: f32) -> Mat4 {
    world * Mat4::from_translation(Vec3::splat(-scale)) * Mat4::from_scale(Vec3::splat(1.0 + scale))
}

pub fn highlight_color(object: &ModelObject, env: &DrawEnv<'_>) -> Vec3 {
    let render = &env.config.render;
    if object.is_hostile() {
        Vec3::from_array(render.hostile_highlight)
    } else {
        Vec3::from_array(render.friendly_highlight)
    }
}

pub(crate) fn draw_shadow(
    object: &ModelObject,
    group: &MeshGroup,
    shadow: Mat4,
    env: &DrawEnv<'_>,
    device: &mut dyn RenderDevice,
    report: &mut DrawReport,
) {
    let Some(mut params) = env.effects.params(EffectKind::Shadow) else {
        return;
    };
    params
        .set("World", ParamValue::Matrix(shadow))
        .set("ViewProjection", ParamValue::Matrix(env.camera.view_projection()))
        .set("ShadowTint", ParamValue::Vec4(Vec4::new(0.0, 0.0, 0.0, object.shadow_opacity)))
        .set("ShadowTexture", ParamValue::Texture(group.key.texture));
    let state = PipelineState {
        blend: BlendId::ShadowBlend,
        raster: RasterState { cull: None, depth_bias: env.config.render.shadow_depth_bias },
        depth: DepthMode::ReadOnly,
    };
    if let Err(err) = device.bind_state(&state).and_then(|_| device.bind_effect(&params)) {
        log::debug!("[render] {}: shadow state rejected: {err:?}", object.name);
        report.draw_failures += 1;
        return;
    }
    report.state_binds += 1;
    overlay_draws(object, group, "shadow", device, report);
}

pub(crate) fn draw_highlight(
    object: &ModelObject,
    group: &MeshGroup,
    highlight: Mat4,
    env: &DrawEnv<'_>,
    device: &mut dyn RenderDevice,
    report: &mut DrawReport,
) {
    let Some(mut params) = env.effects.params(EffectKind::AlphaTest) else {
        return;
    };
    params
        .set("World", ParamValue::Matrix(highlight))
        .set("View", ParamValue::Matrix(env.camera.view()))
        .set("Projection", ParamValue::Matrix(env.camera.projection()))
        .set("Texture", ParamValue::Texture(group.key.texture))
        .set("DiffuseColor", ParamValue::Vec3(highlight_color(object, env)))
        .set("Alpha", ParamValue::Float(1.0));
    let state = PipelineState {
        blend: BlendId::Additive,
        raster: RasterState::sided(group.key.two_sided, object.effective_depth_bias(&env.config.render.depth_bias)),
        depth: DepthMode::ReadOnly,
    };
    if let Err(err) = device.bind_state(&state).and_then(|_| device.bind_effect(&params)) {
        log::debug!("[render] {}: highlight state rejected: {err:?}", object.name);
        report.draw_failures += 1;
        return;
    }
    report.state_binds += 1;
    overlay_draws(object, group, "highlight", device, report);
}

fn overlay_draws(
    object: &ModelObject,
    group: &MeshGroup,
    label: &str,
    device: &mut dyn RenderDevice,
    report: &mut DrawReport,
) {
    for &mesh in &group.meshes {
        let Some(slot) = object.meshes.get(mesh) else {
            continue;
        };
        let Some((vertex_buffer, index_buffer)) = slot.cache.buffers() else {
            continue;
        };
        let draw = DrawCall {
            vertex_buffer,
            index_buffer,
            index_count: slot.cache.index_count,
            texture: group.key.texture,
        };
        match device.draw_indexed(&draw) {
            Ok(()) => report.draw_calls += 1,
            Err(err) => {
                log::debug!("[render] {}: {label} draw failed for mesh {mesh}: {err:?}", object.name);
                report.draw_failures += 1;
            }
        }
    }
}
