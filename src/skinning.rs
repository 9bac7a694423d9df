use crate::assets::TextureProvider;
use crate::dirty::DirtyFlags;
use crate::model::MeshAsset;
use crate::object::ModelObject;
use crate::renderer::device::{BufferId, RenderDevice};
use anyhow::Result;
use glam::{Mat4, Vec3};

/// Squared light delta below which a mesh keeps its cached buffers.
pub const MESH_LIGHT_EPSILON: f32 = 0.01;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [u8; 4],
    pub uv: [f32; 2],
}

impl SkinnedVertex {
    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SkinnedVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute { offset: 0, shader_location: 0, format: wgpu::VertexFormat::Float32x3 },
                wgpu::VertexAttribute { offset: 12, shader_location: 1, format: wgpu::VertexFormat::Float32x3 },
                wgpu::VertexAttribute { offset: 24, shader_location: 2, format: wgpu::VertexFormat::Unorm8x4 },
                wgpu::VertexAttribute { offset: 28, shader_location: 3, format: wgpu::VertexFormat::Float32x2 },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshBufferCache {
    pub vertex_buffer: Option<BufferId>,
    pub index_buffer: Option<BufferId>,
    pub index_count: u32,
    pub cached_light: Vec3,
    pub cached_color: [u8; 4],
    pub last_update_frame: u64,
    pub valid: bool,
}

impl MeshBufferCache {
    pub fn buffers(&self) -> Option<(BufferId, BufferId)> {
        Some((self.vertex_buffer?, self.index_buffer?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildReport {
    pub rebuilt: u32,
    pub skipped: u32,
    pub failed: u32,
    pub lazy_textures: u32,
}

/// Vertex colour for a tint (0..1) lit by `light` (0..255 per channel).
pub fn body_color(tint: Vec3, light: Vec3) -> [u8; 4] {
    let lit = (tint * light).clamp(Vec3::ZERO, Vec3::splat(255.0));
    [lit.x as u8, lit.y as u8, lit.z as u8, 255]
}

/// Skins every vertex of `mesh` by its bone. Vertices whose bone is missing from `bones`
/// are emitted unskinned; the count of those is returned.
pub fn skin_mesh(mesh: &MeshAsset, bones: &[Mat4], color: [u8; 4], out: &mut Vec<SkinnedVertex>) -> usize {
    out.clear();
    out.reserve(mesh.vertices.len());
    let mut unskinned = 0;
    for vertex in &mesh.vertices {
        let (position, normal) = match bones.get(vertex.bone as usize) {
            Some(bone) => (bone.transform_point3(vertex.position), bone.transform_vector3(vertex.normal)),
            None => {
                unskinned += 1;
                (vertex.position, vertex.normal)
            }
        };
        out.push(SkinnedVertex {
            position: position.to_array(),
            normal: normal.normalize_or_zero().to_array(),
            color,
            uv: vertex.uv.to_array(),
        });
    }
    unskinned
}

/// Inputs for one rebuild pass that live outside the object.
pub struct BuildInputs<'a> {
    /// Parent bone set for animation-linked children; `None` uses the object's own.
    pub shared_bones: Option<&'a [Mat4]>,
    /// Terrain light plus the object's own light.
    pub base_light: Vec3,
    pub frame_index: u64,
}

/// Brings the object's per-mesh buffers up to date with its dirty flags.
///
/// Invisible objects keep their flags for the next visible frame. Transform-only changes
/// need no reskinning. Attachments with an update stride above one only reskin for
/// animation on their stride frames.
pub fn rebuild_buffers(
    object: &mut ModelObject,
    inputs: BuildInputs<'_>,
    textures: &dyn TextureProvider,
    device: &mut dyn RenderDevice,
    scratch: &mut Vec<SkinnedVertex>,
) -> BuildReport {
    let mut report = BuildReport::default();
    let flags = object.dirty;
    if flags.is_empty() {
        return report;
    }
    let Some(model) = object.model.clone() else {
        return report;
    };
    if model.meshes.is_empty() || !object.visible || object.out_of_view {
        return report;
    }
    if (flags - DirtyFlags::TRANSFORM).is_empty() {
        object.dirty.remove(DirtyFlags::TRANSFORM);
        return report;
    }
    let stride = object.animation_update_stride as u64;
    if flags.is_animation_only() && stride > 1 && (inputs.frame_index + object.stride_offset as u64) % stride != 0 {
        object.dirty.remove(DirtyFlags::TRANSFORM);
        return report;
    }

    let own_bones = std::mem::take(&mut object.bones);
    let bones = inputs.shared_bones.unwrap_or(own_bones.as_slice());
    let needs_light = flags.intersects(DirtyFlags::LIGHTING | DirtyFlags::MATERIAL);

    for index in 0..model.meshes.len().min(object.meshes.len()) {
        if object.is_hidden_mesh(index) && !flags.contains(DirtyFlags::TEXTURE) {
            continue;
        }
        let cache = object.meshes[index].cache;
        let mesh_light = if needs_light || !cache.valid {
            let fresh = if object.is_blend_mesh(index) {
                inputs.base_light * object.blend_mesh_light
            } else {
                inputs.base_light * object.alpha
            };
            // Drift below the threshold keeps the cached light.
            if !cache.valid || fresh.distance_squared(cache.cached_light) > MESH_LIGHT_EPSILON {
                fresh
            } else {
                cache.cached_light
            }
        } else {
            cache.cached_light
        };
        let color = body_color(object.color, mesh_light);
        if cache.valid && color == cache.cached_color && !flags.intersects(DirtyFlags::ANIMATION | DirtyFlags::TEXTURE) {
            report.skipped += 1;
            continue;
        }

        let mesh = &model.meshes[index];
        let unskinned = skin_mesh(mesh, bones, color, scratch);
        if unskinned > 0 {
            log::debug!(
                "[skinning] {}: mesh {index} has {unskinned} vertices bound past {} bones",
                object.name,
                bones.len()
            );
        }
        match upload(device, &cache, scratch, &mesh.indices) {
            Ok((vertex_buffer, index_buffer)) => {
                let slot = &mut object.meshes[index];
                slot.cache = MeshBufferCache {
                    vertex_buffer: Some(vertex_buffer),
                    index_buffer: Some(index_buffer),
                    index_count: mesh.indices.len() as u32,
                    cached_light: mesh_light,
                    cached_color: color,
                    last_update_frame: inputs.frame_index,
                    valid: true,
                };
                report.rebuilt += 1;
            }
            Err(err) => {
                log::debug!("[skinning] {}: mesh {index} upload failed: {err:?}", object.name);
                report.failed += 1;
                continue;
            }
        }

        let slot = &mut object.meshes[index];
        if slot.texture.is_none() && flags.contains(DirtyFlags::TEXTURE) {
            if let Some(path) = slot.texture_path.as_deref() {
                log::debug!("[skinning] {}: lazy texture load for mesh {index} ({path}); may stutter", object.name);
                slot.texture = textures.texture(path);
                report.lazy_textures += 1;
            }
        }
    }

    object.bones = own_bones;
    object.dirty = DirtyFlags::empty();
    report
}

fn upload(
    device: &mut dyn RenderDevice,
    cache: &MeshBufferCache,
    vertices: &[SkinnedVertex],
    indices: &[u32],
) -> Result<(BufferId, BufferId)> {
    let vertex_buffer = device.upload_vertices(cache.vertex_buffer, bytemuck::cast_slice(vertices))?;
    // Index data never changes once uploaded.
    let index_buffer = match cache.index_buffer {
        Some(buffer) if cache.valid => buffer,
        existing => device.upload_indices(existing, indices)?,
    };
    Ok((vertex_buffer, index_buffer))
}

/// Returns every buffer the object holds to the device and invalidates the caches.
pub fn release_buffers(object: &mut ModelObject, device: &mut dyn RenderDevice) {
    for slot in &mut object.meshes {
        if let Some(buffer) = slot.cache.vertex_buffer.take() {
            device.release_buffer(buffer);
        }
        if let Some(buffer) = slot.cache.index_buffer.take() {
            device.release_buffer(buffer);
        }
        slot.cache = MeshBufferCache::default();
    }
}
