//! [`RenderDevice`] backed by wgpu. Buffers live on the GPU, pipelines are built lazily per
//! distinct [`PipelineState`] and recorded draws are encoded into one pass by [`WgpuDevice::submit`].

use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec4};
use std::collections::HashMap;
use std::num::NonZeroU64;
use wgpu::util::DeviceExt;

use super::blend::BlendId;
use super::device::{BufferId, DepthMode, DrawCall, PipelineState, RenderDevice};
use crate::assets::TextureHandle;
use crate::effects::{EffectKind, EffectParams, ParamValue};
use crate::skinning::SkinnedVertex;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
/// Fragments whose alpha falls below this are discarded by the alpha-tested paths.
const ALPHA_CUTOFF: f32 = 0.25;
/// Configured depth bias is expressed in steps of a 24-bit depth buffer.
const DEPTH_BIAS_STEPS: f32 = 16_777_216.0;
const INITIAL_EFFECT_SLOTS: usize = 64;
const EFFECT_UNIFORM_SIZE: u64 = std::mem::size_of::<EffectUniform>() as u64;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct EffectUniform {
    world_view_proj: [[f32; 4]; 4],
    diffuse: [f32; 4],
    tint: [f32; 4],
    params: [f32; 4],
}

impl EffectUniform {
    fn from_params(params: &EffectParams<'_>) -> Self {
        let matrix = |name: &str| match params.get(name) {
            Some(ParamValue::Matrix(m)) => Some(*m),
            _ => None,
        };
        let float = |name: &str| match params.get(name) {
            Some(ParamValue::Float(v)) => Some(*v),
            _ => None,
        };
        let world = matrix("World").unwrap_or(Mat4::IDENTITY);
        let world_view_proj = matrix("WorldViewProjection")
            .or_else(|| matrix("ViewProjection").map(|vp| vp * world))
            .or_else(|| match (matrix("Projection"), matrix("View")) {
                (Some(proj), Some(view)) => Some(proj * view * world),
                _ => None,
            })
            .unwrap_or(world);

        let rgb = match params.get("DiffuseColor") {
            Some(ParamValue::Vec3(color)) => *color,
            _ => glam::Vec3::ONE,
        };
        let diffuse = rgb.extend(float("Alpha").unwrap_or(1.0));

        let tint = match (params.get("ShadowTint"), params.get("GlowColor")) {
            (Some(ParamValue::Vec4(tint)), _) => *tint,
            (_, Some(ParamValue::Vec3(glow))) => glow.extend(float("GlowIntensity").unwrap_or(1.0)),
            _ => Vec4::ZERO,
        };
        let solid = if params.kind() == EffectKind::Shadow { 1.0 } else { 0.0 };
        let light_count = match params.get("ActiveLightCount") {
            Some(ParamValue::Int(count)) => *count as f32,
            _ => 0.0,
        };

        Self {
            world_view_proj: world_view_proj.to_cols_array_2d(),
            diffuse: diffuse.to_array(),
            tint: tint.to_array(),
            params: [ALPHA_CUTOFF, float("Time").unwrap_or(0.0), light_count, solid],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    blend: BlendId,
    cull: Option<wgpu::Face>,
    depth_write: bool,
    depth_bias: i32,
}

impl PipelineKey {
    fn from_state(state: &PipelineState) -> Self {
        Self {
            blend: state.blend,
            cull: state.raster.cull,
            depth_write: state.depth == DepthMode::ReadWrite,
            depth_bias: (state.raster.depth_bias * DEPTH_BIAS_STEPS).round() as i32,
        }
    }
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    usage: wgpu::BufferUsages,
}

struct QueuedDraw {
    pipeline: PipelineKey,
    effect_slot: usize,
    texture: TextureHandle,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    index_count: u32,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    size: (u32, u32),
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    texture_bgl: wgpu::BindGroupLayout,
    effect_bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback_texture: wgpu::BindGroup,
    textures: HashMap<TextureHandle, wgpu::BindGroup>,
    effect_buffer: wgpu::Buffer,
    effect_bind_group: wgpu::BindGroup,
    effect_stride: u64,
    effect_capacity: usize,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    buffers: HashMap<BufferId, GpuBuffer>,
    next_buffer: u64,
    current_pipeline: Option<PipelineKey>,
    current_effect: Option<usize>,
    effects: Vec<EffectUniform>,
    draws: Vec<QueuedDraw>,
    depth_view: wgpu::TextureView,
    offscreen: Option<wgpu::Texture>,
}

impl WgpuDevice {
    /// Requests an adapter without a surface and renders into an offscreen target.
    pub async fn headless(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request headless adapter")?;
        let device_desc = wgpu::DeviceDescriptor {
            label: Some("Skinned Model Device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };
        let (device, queue) =
            adapter.request_device(&device_desc).await.context("Failed to request headless device")?;
        let mut gpu = Self::new(device, queue, HEADLESS_FORMAT, width, height);
        gpu.offscreen = Some(gpu.create_offscreen());
        Ok(gpu)
    }

    /// Wraps an existing device. Views passed to [`Self::submit`] must use `color_format`
    /// and match the size given here or set by [`Self::resize`].
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        color_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Skinned Model Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/skinned_model.wgsl").into()),
        });

        let effect_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Skinned Effect BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(EFFECT_UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Skinned Texture BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Skinned Model Pipeline Layout"),
            bind_group_layouts: &[&effect_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Skinned Model Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("Skinned Fallback Texture"),
                size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let white_view = white.create_view(&wgpu::TextureViewDescriptor::default());
        let fallback_texture = texture_bind_group(&device, &texture_bgl, &white_view, &sampler);

        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment.max(1));
        let effect_stride = EFFECT_UNIFORM_SIZE.div_ceil(alignment) * alignment;
        let (effect_buffer, effect_bind_group) =
            effect_resources(&device, &effect_bgl, effect_stride, INITIAL_EFFECT_SLOTS);
        let depth_view = depth_target(&device, width, height);

        Self {
            device,
            queue,
            color_format,
            size: (width.max(1), height.max(1)),
            shader,
            pipeline_layout,
            texture_bgl,
            effect_bgl,
            sampler,
            fallback_texture,
            textures: HashMap::new(),
            effect_buffer,
            effect_bind_group,
            effect_stride,
            effect_capacity: INITIAL_EFFECT_SLOTS,
            pipelines: HashMap::new(),
            buffers: HashMap::new(),
            next_buffer: 0,
            current_pipeline: None,
            current_effect: None,
            effects: Vec::new(),
            draws: Vec::new(),
            depth_view,
            offscreen: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
        self.depth_view = depth_target(&self.device, width, height);
        if self.offscreen.is_some() {
            self.offscreen = Some(self.create_offscreen());
        }
    }

    /// Makes `view` the texture drawn for `handle`. Unregistered handles sample plain white.
    pub fn register_texture(&mut self, handle: TextureHandle, view: &wgpu::TextureView) {
        let bind_group = texture_bind_group(&self.device, &self.texture_bgl, view, &self.sampler);
        self.textures.insert(handle, bind_group);
    }

    pub fn offscreen_texture(&self) -> Option<&wgpu::Texture> {
        self.offscreen.as_ref()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer_size(&self, buffer: BufferId) -> Option<u64> {
        self.buffers.get(&buffer).map(|entry| entry.size)
    }

    pub fn queued_draws(&self) -> usize {
        self.draws.len()
    }

    /// Encodes every draw recorded since the last submit into one pass that clears colour and
    /// depth, then submits it. Renders into `target`, or the offscreen texture when `None`.
    /// Returns the number of draws encoded.
    pub fn submit(&mut self, target: Option<&wgpu::TextureView>) -> Result<u32> {
        let offscreen_view;
        let view = match target {
            Some(view) => view,
            None => {
                let texture = self.offscreen.as_ref().context("No render target: pass a view or use a headless device")?;
                offscreen_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                &offscreen_view
            }
        };

        self.write_effects();
        let draws = std::mem::take(&mut self.draws);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Skinned Model Encoder"),
        });
        let mut encoded = 0u32;
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Skinned Model Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            for draw in &draws {
                let (Some(pipeline), Some(vertices), Some(indices)) = (
                    self.pipelines.get(&draw.pipeline),
                    self.buffers.get(&draw.vertex_buffer),
                    self.buffers.get(&draw.index_buffer),
                ) else {
                    log::debug!("[gpu] dropping draw whose buffers were released before submit");
                    continue;
                };
                let index_bytes = u64::from(draw.index_count) * std::mem::size_of::<u32>() as u64;
                if draw.index_count == 0 || vertices.size == 0 || indices.size < index_bytes {
                    continue;
                }
                let texture = self.textures.get(&draw.texture).unwrap_or(&self.fallback_texture);
                let offset = (draw.effect_slot as u64 * self.effect_stride) as wgpu::DynamicOffset;
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.effect_bind_group, &[offset]);
                pass.set_bind_group(1, texture, &[]);
                pass.set_vertex_buffer(0, vertices.buffer.slice(..vertices.size));
                pass.set_index_buffer(indices.buffer.slice(..index_bytes), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
                encoded += 1;
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.effects.clear();
        self.current_effect = None;
        Ok(encoded)
    }

    fn write_effects(&mut self) {
        if self.effects.is_empty() {
            return;
        }
        if self.effects.len() > self.effect_capacity {
            let mut capacity = self.effect_capacity.max(1);
            while capacity < self.effects.len() {
                capacity *= 2;
            }
            let (buffer, bind_group) = effect_resources(&self.device, &self.effect_bgl, self.effect_stride, capacity);
            self.effect_buffer = buffer;
            self.effect_bind_group = bind_group;
            self.effect_capacity = capacity;
        }
        let stride = self.effect_stride as usize;
        let mut staging = vec![0u8; stride * self.effects.len()];
        for (slot, effect) in self.effects.iter().enumerate() {
            let bytes = bytemuck::bytes_of(effect);
            staging[slot * stride..slot * stride + bytes.len()].copy_from_slice(bytes);
        }
        self.queue.write_buffer(&self.effect_buffer, 0, &staging);
    }

    fn upload(&mut self, existing: Option<BufferId>, bytes: &[u8], usage: wgpu::BufferUsages) -> Result<BufferId> {
        if bytes.len() as u64 > self.device.limits().max_buffer_size {
            bail!("{} byte upload exceeds the device buffer limit", bytes.len());
        }
        let reuse = existing.filter(|id| self.buffers.get(id).is_some_and(|entry| entry.usage == usage));
        if let Some(id) = reuse {
            if let Some(entry) = self.buffers.get_mut(&id) {
                let capacity = entry.buffer.size();
                if bytes.len() as u64 <= capacity && bytes.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize == 0 {
                    if !bytes.is_empty() {
                        self.queue.write_buffer(&entry.buffer, 0, bytes);
                    }
                    entry.size = bytes.len() as u64;
                    return Ok(id);
                }
            }
        }
        let id = reuse.unwrap_or_else(|| {
            self.next_buffer += 1;
            BufferId(self.next_buffer)
        });
        let label = if usage.contains(wgpu::BufferUsages::INDEX) { "Skinned Index Buffer" } else { "Skinned Vertex Buffer" };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytes,
            usage: usage | wgpu::BufferUsages::COPY_DST,
        });
        self.buffers.insert(id, GpuBuffer { buffer, size: bytes.len() as u64, usage });
        Ok(id)
    }

    fn create_pipeline(&self, key: PipelineKey) -> wgpu::RenderPipeline {
        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Skinned Model Pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                buffers: &[SkinnedVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: Some(key.blend.descriptor()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: key.cull,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: key.depth_write,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState { constant: key.depth_bias, slope_scale: 0.0, clamp: 0.0 },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn create_offscreen(&self) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Skinned Offscreen Target"),
            size: wgpu::Extent3d { width: self.size.0, height: self.size.1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }
}

impl RenderDevice for WgpuDevice {
    fn upload_vertices(&mut self, existing: Option<BufferId>, bytes: &[u8]) -> Result<BufferId> {
        self.upload(existing, bytes, wgpu::BufferUsages::VERTEX)
    }

    fn upload_indices(&mut self, existing: Option<BufferId>, indices: &[u32]) -> Result<BufferId> {
        self.upload(existing, bytemuck::cast_slice(indices), wgpu::BufferUsages::INDEX)
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if let Some(entry) = self.buffers.remove(&buffer) {
            entry.buffer.destroy();
        }
    }

    fn bind_state(&mut self, state: &PipelineState) -> Result<()> {
        let key = PipelineKey::from_state(state);
        if !self.pipelines.contains_key(&key) {
            let pipeline = self.create_pipeline(key);
            self.pipelines.insert(key, pipeline);
        }
        self.current_pipeline = Some(key);
        Ok(())
    }

    fn bind_effect(&mut self, params: &EffectParams<'_>) -> Result<()> {
        self.current_effect = Some(self.effects.len());
        self.effects.push(EffectUniform::from_params(params));
        Ok(())
    }

    fn draw_indexed(&mut self, draw: &DrawCall) -> Result<()> {
        let pipeline = self.current_pipeline.ok_or_else(|| anyhow!("draw issued before any state bind"))?;
        let effect_slot = self.current_effect.ok_or_else(|| anyhow!("draw issued before any effect bind"))?;
        if !self.buffers.contains_key(&draw.vertex_buffer) || !self.buffers.contains_key(&draw.index_buffer) {
            bail!("draw references released buffers");
        }
        self.draws.push(QueuedDraw {
            pipeline,
            effect_slot,
            texture: draw.texture,
            vertex_buffer: draw.vertex_buffer,
            index_buffer: draw.index_buffer,
            index_count: draw.index_count,
        });
        Ok(())
    }
}

fn texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Skinned Texture BG"),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
    })
}

fn effect_resources(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    stride: u64,
    slots: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Skinned Effect Buffer"),
        size: stride * slots as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Skinned Effect BG"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(EFFECT_UNIFORM_SIZE),
            }),
        }],
    });
    (buffer, bind_group)
}

fn depth_target(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Skinned Depth Texture"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RasterState;

    #[test]
    fn pipeline_keys_fold_bias_into_depth_steps() {
        let state = PipelineState {
            blend: BlendId::ShadowBlend,
            raster: RasterState::sided(true, -20.0 / DEPTH_BIAS_STEPS),
            depth: DepthMode::ReadOnly,
        };
        let key = PipelineKey::from_state(&state);
        assert_eq!(key.depth_bias, -20);
        assert_eq!(key.cull, None);
        assert!(!key.depth_write);
        let solid = PipelineState { raster: RasterState::sided(false, 0.0), depth: DepthMode::ReadWrite, ..state };
        assert_ne!(PipelineKey::from_state(&solid), key);
    }

    #[test]
    fn effect_uniform_composes_split_matrices() {
        let registry = crate::effects::EffectRegistry::standard();
        let mut params = registry.params(EffectKind::AlphaTest).expect("alpha test registered");
        let world = Mat4::from_translation(glam::Vec3::X);
        let view = Mat4::from_translation(glam::Vec3::Y);
        let proj = Mat4::from_scale(glam::Vec3::splat(2.0));
        params.set("World", ParamValue::Matrix(world));
        params.set("View", ParamValue::Matrix(view));
        params.set("Projection", ParamValue::Matrix(proj));
        params.set("Alpha", ParamValue::Float(0.5));
        let uniform = EffectUniform::from_params(&params);
        assert_eq!(uniform.world_view_proj, (proj * view * world).to_cols_array_2d());
        assert_eq!(uniform.diffuse[3], 0.5);
        assert_eq!(uniform.params[3], 0.0);
    }
}
