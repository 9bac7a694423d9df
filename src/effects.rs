use crate::assets::TextureHandle;
use glam::{Mat4, Vec3, Vec4};
use smallvec::SmallVec;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Baseline fixed-function style effect; always present.
    AlphaTest,
    DynamicLighting,
    ItemMaterial,
    MonsterMaterial,
    Shadow,
}

impl EffectKind {
    pub fn label(self) -> &'static str {
        match self {
            EffectKind::AlphaTest => "alpha_test",
            EffectKind::DynamicLighting => "dynamic_lighting",
            EffectKind::ItemMaterial => "item_material",
            EffectKind::MonsterMaterial => "monster_material",
            EffectKind::Shadow => "shadow",
        }
    }

    /// Parameter slots the stock shader for this effect declares.
    pub fn standard_slots(self) -> &'static [&'static str] {
        match self {
            EffectKind::AlphaTest => &["World", "View", "Projection", "Texture", "DiffuseColor", "Alpha"],
            EffectKind::DynamicLighting => &[
                "World",
                "View",
                "Projection",
                "WorldViewProjection",
                "EyePosition",
                "DiffuseTexture",
                "Alpha",
                "AmbientLight",
                "TerrainLight",
                "ActiveLightCount",
                "MaxLightsToProcess",
                "LightPositions",
                "LightColors",
                "LightRadii",
                "LightIntensities",
                "DebugLightingAreas",
            ],
            EffectKind::ItemMaterial => &[
                "WorldViewProjection",
                "World",
                "View",
                "Projection",
                "EyePosition",
                "DiffuseTexture",
                "ItemOptions",
                "Time",
                "IsAncient",
                "IsExcellent",
                "Alpha",
            ],
            EffectKind::MonsterMaterial => &[
                "World",
                "View",
                "Projection",
                "EyePosition",
                "DiffuseTexture",
                "GlowColor",
                "GlowIntensity",
                "EnableGlow",
                "Time",
                "Alpha",
            ],
            EffectKind::Shadow => &["World", "ViewProjection", "ShadowTint", "ShadowTexture"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Matrix(Mat4),
    Vec3(Vec3),
    Vec4(Vec4),
    Float(f32),
    Int(i32),
    Bool(bool),
    Texture(TextureHandle),
    Vec3Array(SmallVec<[Vec3; 16]>),
    FloatArray(SmallVec<[f32; 16]>),
}

/// Values for one effect bind, restricted to the slots the effect declares.
#[derive(Debug, Clone)]
pub struct EffectParams<'r> {
    kind: EffectKind,
    declared: &'r [&'static str],
    values: SmallVec<[(&'static str, ParamValue); 16]>,
}

impl<'r> EffectParams<'r> {
    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    /// Writes `value` if the effect has a slot called `name`; other names are dropped.
    pub fn set(&mut self, name: &'static str, value: ParamValue) -> &mut Self {
        if !self.declared.contains(&name) {
            return self;
        }
        match self.values.iter_mut().find(|(slot, _)| *slot == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(slot, _)| *slot == name).map(|(_, value)| value)
    }

    pub fn values(&self) -> &[(&'static str, ParamValue)] {
        &self.values
    }
}

/// Effects available on the current device and the slots each one exposes.
#[derive(Debug, Clone)]
pub struct EffectRegistry {
    effects: HashMap<EffectKind, Vec<&'static str>>,
}

impl EffectRegistry {
    /// Only the baseline alpha-test effect.
    pub fn baseline() -> Self {
        let mut effects = HashMap::new();
        effects.insert(EffectKind::AlphaTest, EffectKind::AlphaTest.standard_slots().to_vec());
        Self { effects }
    }

    /// Every stock effect with its standard slots.
    pub fn standard() -> Self {
        let mut registry = Self::baseline();
        for kind in [
            EffectKind::DynamicLighting,
            EffectKind::ItemMaterial,
            EffectKind::MonsterMaterial,
            EffectKind::Shadow,
        ] {
            registry.register(kind, kind.standard_slots());
        }
        registry
    }

    pub fn register(&mut self, kind: EffectKind, slots: &[&'static str]) {
        self.effects.insert(kind, slots.to_vec());
    }

    /// Removing the baseline effect is not allowed; the request is ignored.
    pub fn remove(&mut self, kind: EffectKind) {
        if kind != EffectKind::AlphaTest {
            self.effects.remove(&kind);
        }
    }

    pub fn has(&self, kind: EffectKind) -> bool {
        self.effects.contains_key(&kind)
    }

    /// Empty parameter block for `kind`, or `None` when the effect is unavailable.
    pub fn params(&self, kind: EffectKind) -> Option<EffectParams<'_>> {
        self.effects.get(&kind).map(|declared| EffectParams { kind, declared: declared.as_slice(), values: SmallVec::new() })
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
