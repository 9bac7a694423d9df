use std::collections::HashMap;
use wgpu::{BlendComponent, BlendFactor, BlendOperation, BlendState};

/// Named blend modes referenced by model files and entity settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlendId {
    Opaque,
    AlphaBlend,
    Additive,
    NonPremultiplied,
    Multiply,
    DarkBlend,
    InverseDestination,
    ShadowBlend,
}

impl BlendId {
    pub const ALL: [BlendId; 8] = [
        BlendId::Opaque,
        BlendId::AlphaBlend,
        BlendId::Additive,
        BlendId::NonPremultiplied,
        BlendId::Multiply,
        BlendId::DarkBlend,
        BlendId::InverseDestination,
        BlendId::ShadowBlend,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlendId::Opaque => "Opaque",
            BlendId::AlphaBlend => "AlphaBlend",
            BlendId::Additive => "Additive",
            BlendId::NonPremultiplied => "NonPremultiplied",
            BlendId::Multiply => "Multiply",
            BlendId::DarkBlend => "DarkBlend",
            BlendId::InverseDestination => "InverseDestination",
            BlendId::ShadowBlend => "ShadowBlend",
        }
    }

    pub fn descriptor(self) -> BlendState {
        match self {
            BlendId::Opaque => BlendState::REPLACE,
            BlendId::AlphaBlend => BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            BlendId::NonPremultiplied => BlendState::ALPHA_BLENDING,
            BlendId::Additive => uniform(BlendFactor::SrcAlpha, BlendFactor::One, BlendOperation::Add),
            BlendId::Multiply => uniform(BlendFactor::Dst, BlendFactor::Zero, BlendOperation::Add),
            BlendId::DarkBlend => uniform(BlendFactor::Zero, BlendFactor::OneMinusSrc, BlendOperation::Add),
            BlendId::InverseDestination => uniform(BlendFactor::OneMinusDst, BlendFactor::Zero, BlendOperation::Add),
            BlendId::ShadowBlend => BlendState {
                color: BlendComponent {
                    src_factor: BlendFactor::SrcAlpha,
                    dst_factor: BlendFactor::OneMinusSrcAlpha,
                    operation: BlendOperation::Add,
                },
                alpha: BlendComponent {
                    src_factor: BlendFactor::Zero,
                    dst_factor: BlendFactor::One,
                    operation: BlendOperation::Add,
                },
            },
        }
    }
}

fn uniform(src_factor: BlendFactor, dst_factor: BlendFactor, operation: BlendOperation) -> BlendState {
    let component = BlendComponent { src_factor, dst_factor, operation };
    BlendState { color: component, alpha: component }
}

/// Name to blend mode table, built once at startup.
#[derive(Debug, Clone)]
pub struct BlendRegistry {
    by_name: HashMap<&'static str, BlendId>,
}

impl BlendRegistry {
    pub fn new() -> Self {
        Self { by_name: BlendId::ALL.iter().map(|id| (id.name(), *id)).collect() }
    }

    /// Unknown names resolve to `None` so callers keep their default state.
    pub fn resolve(&self, name: &str) -> Option<BlendId> {
        self.by_name.get(name).copied()
    }

    pub fn descriptor(&self, id: BlendId) -> BlendState {
        id.descriptor()
    }
}

impl Default for BlendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
