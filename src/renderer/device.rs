use super::blend::BlendId;
use crate::assets::TextureHandle;
use crate::effects::{EffectKind, EffectParams, ParamValue};
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    /// `None` draws both faces.
    pub cull: Option<wgpu::Face>,
    pub depth_bias: f32,
}

impl RasterState {
    pub fn sided(two_sided: bool, depth_bias: f32) -> Self {
        Self { cull: if two_sided { None } else { Some(wgpu::Face::Back) }, depth_bias }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    pub blend: BlendId,
    pub raster: RasterState,
    pub depth: DepthMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub texture: TextureHandle,
}

/// GPU command surface used by model rendering.
///
/// Every call is fallible. Callers isolate failures per mesh.
pub trait RenderDevice {
    /// Uploads vertex bytes, reusing `existing` when given.
    fn upload_vertices(&mut self, existing: Option<BufferId>, bytes: &[u8]) -> Result<BufferId>;
    fn upload_indices(&mut self, existing: Option<BufferId>, indices: &[u32]) -> Result<BufferId>;
    fn release_buffer(&mut self, buffer: BufferId);
    fn bind_state(&mut self, state: &PipelineState) -> Result<()>;
    fn bind_effect(&mut self, params: &EffectParams<'_>) -> Result<()>;
    fn draw_indexed(&mut self, draw: &DrawCall) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    UploadVertices { buffer: BufferId, bytes: usize },
    UploadIndices { buffer: BufferId, count: usize },
    Release(BufferId),
    BindState(PipelineState),
    BindEffect { kind: EffectKind, values: Vec<(&'static str, ParamValue)> },
    Draw(DrawCall),
}

/// Device that keeps every command and buffer in memory. Draws against textures
/// listed in `failing_textures` return an error.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<DeviceCommand>,
    vertex_data: HashMap<BufferId, Vec<u8>>,
    index_data: HashMap<BufferId, Vec<u32>>,
    next_buffer: u64,
    failing_textures: HashSet<TextureHandle>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_draws_with(&mut self, texture: TextureHandle) {
        self.failing_textures.insert(texture);
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DeviceCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn state_binds(&self) -> impl Iterator<Item = &PipelineState> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DeviceCommand::BindState(state) => Some(state),
            _ => None,
        })
    }

    pub fn effect_binds(&self) -> impl Iterator<Item = (EffectKind, &[(&'static str, ParamValue)])> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DeviceCommand::BindEffect { kind, values } => Some((*kind, values.as_slice())),
            _ => None,
        })
    }

    pub fn vertex_uploads(&self) -> usize {
        self.commands.iter().filter(|cmd| matches!(cmd, DeviceCommand::UploadVertices { .. })).count()
    }

    pub fn live_buffers(&self) -> usize {
        self.vertex_data.len() + self.index_data.len()
    }

    /// Decodes a vertex buffer as `T`.
    pub fn vertices<T: bytemuck::Pod>(&self, buffer: BufferId) -> Option<Vec<T>> {
        self.vertex_data.get(&buffer).map(|bytes| bytemuck::pod_collect_to_vec(bytes.as_slice()))
    }

    pub fn indices(&self, buffer: BufferId) -> Option<&[u32]> {
        self.index_data.get(&buffer).map(Vec::as_slice)
    }

    fn allocate(&mut self, existing: Option<BufferId>) -> BufferId {
        existing.unwrap_or_else(|| {
            self.next_buffer += 1;
            BufferId(self.next_buffer)
        })
    }
}

impl RenderDevice for RecordingDevice {
    fn upload_vertices(&mut self, existing: Option<BufferId>, bytes: &[u8]) -> Result<BufferId> {
        let reuse = existing.filter(|id| self.vertex_data.contains_key(id));
        let buffer = self.allocate(reuse);
        self.vertex_data.insert(buffer, bytes.to_vec());
        self.commands.push(DeviceCommand::UploadVertices { buffer, bytes: bytes.len() });
        Ok(buffer)
    }

    fn upload_indices(&mut self, existing: Option<BufferId>, indices: &[u32]) -> Result<BufferId> {
        let reuse = existing.filter(|id| self.index_data.contains_key(id));
        let buffer = self.allocate(reuse);
        self.index_data.insert(buffer, indices.to_vec());
        self.commands.push(DeviceCommand::UploadIndices { buffer, count: indices.len() });
        Ok(buffer)
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        self.vertex_data.remove(&buffer);
        self.index_data.remove(&buffer);
        self.commands.push(DeviceCommand::Release(buffer));
    }

    fn bind_state(&mut self, state: &PipelineState) -> Result<()> {
        self.commands.push(DeviceCommand::BindState(*state));
        Ok(())
    }

    fn bind_effect(&mut self, params: &EffectParams<'_>) -> Result<()> {
        self.commands.push(DeviceCommand::BindEffect { kind: params.kind(), values: params.values().to_vec() });
        Ok(())
    }

    fn draw_indexed(&mut self, draw: &DrawCall) -> Result<()> {
        if self.failing_textures.contains(&draw.texture) {
            return Err(anyhow!("draw rejected for texture {:?}", draw.texture));
        }
        if !self.vertex_data.contains_key(&draw.vertex_buffer) || !self.index_data.contains_key(&draw.index_buffer) {
            return Err(anyhow!("draw references released buffers"));
        }
        self.commands.push(DeviceCommand::Draw(*draw));
        Ok(())
    }
}
