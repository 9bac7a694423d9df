pub mod animation;
pub mod assets;
pub mod bounds;
pub mod camera3d;
pub mod config;
pub mod dirty;
pub mod effects;
pub mod environment;
pub mod model;
pub mod object;
pub mod renderer;
pub mod skeleton;
pub mod skinning;
pub mod time;
pub mod world;

pub use config::EngineConfig;
pub use dirty::DirtyFlags;
pub use object::{MeshSelector, ModelObject, ObjectClass};
pub use world::{FrameContext, FrameStats, ModelId, ModelWorld};

pub(crate) fn mat4_is_finite(m: &glam::Mat4) -> bool {
    m.to_cols_array().iter().all(|v| v.is_finite())
}
