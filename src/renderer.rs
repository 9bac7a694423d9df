//! Model drawing: state grouping, per-mesh render paths and overlays, all issued
//! against the [`RenderDevice`] abstraction.

pub mod blend;
pub mod device;
pub mod dispatch;
pub mod gpu;
pub mod grouping;
pub mod overlay;

pub use blend::{BlendId, BlendRegistry};
pub use device::{
    BufferId, DepthMode, DeviceCommand, DrawCall, PipelineState, RasterState, RecordingDevice, RenderDevice,
};
pub use dispatch::{classify_path, draw_object, DrawReport, RenderPath};
pub use gpu::WgpuDevice;
pub use grouping::{group_meshes, MeshGroup, MeshStateKey};
pub use overlay::{highlight_matrix, shadow_matrix};

use crate::camera3d::CameraView;
use crate::config::EngineConfig;
use crate::effects::EffectRegistry;
use crate::environment::TerrainLighting;
use crate::time::FrameTime;

/// The two ordered passes every object is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawPass {
    /// Opaque and alpha-tested meshes.
    Solid,
    /// Alpha-channel textured and blend meshes, drawn after every solid pass.
    Translucent,
}

/// Everything outside the object that one draw call needs.
pub struct DrawEnv<'a> {
    pub config: &'a EngineConfig,
    pub blends: &'a BlendRegistry,
    pub effects: &'a EffectRegistry,
    pub camera: &'a dyn CameraView,
    pub terrain: &'a dyn TerrainLighting,
    pub time: FrameTime,
}
