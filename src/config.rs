use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AnimationConfig {
    #[serde(default = "AnimationConfig::default_blend_duration")]
    pub blend_duration: f32,
    #[serde(default = "AnimationConfig::default_throttle_hz")]
    pub throttle_hz: f32,
    #[serde(default = "AnimationConfig::default_speed")]
    pub default_speed: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightingConfig {
    #[serde(default = "LightingConfig::default_light_change_threshold")]
    pub light_change_threshold: f32,
    #[serde(default = "LightingConfig::default_main_light_change_threshold")]
    pub main_light_change_threshold: f32,
    #[serde(default = "LightingConfig::default_light_check_interval_ms")]
    pub light_check_interval_ms: f64,
    #[serde(default = "LightingConfig::default_main_light_check_interval_ms")]
    pub main_light_check_interval_ms: f64,
    #[serde(default = "LightingConfig::default_light_sample_grid")]
    pub light_sample_grid: f32,
    #[serde(default = "LightingConfig::default_dynamic_ambient")]
    pub dynamic_ambient: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundsConfig {
    #[serde(default = "BoundsConfig::default_update_interval")]
    pub update_interval: u32,
    #[serde(default = "BoundsConfig::default_max_samples_per_mesh")]
    pub max_samples_per_mesh: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShaderConfig {
    #[serde(default)]
    pub dynamic_lighting: bool,
    #[serde(default = "ShaderConfig::enabled")]
    pub item_material: bool,
    #[serde(default = "ShaderConfig::enabled")]
    pub monster_material: bool,
    #[serde(default)]
    pub optimize_for_integrated_gpu: bool,
    #[serde(default = "ShaderConfig::default_max_lights")]
    pub max_lights: usize,
    #[serde(default = "ShaderConfig::default_integrated_max_lights")]
    pub integrated_max_lights: usize,
    #[serde(default)]
    pub debug_lighting_areas: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DepthBiasConfig {
    #[serde(default = "DepthBiasConfig::default_player")]
    pub player: f32,
    #[serde(default = "DepthBiasConfig::default_dropped_item")]
    pub dropped_item: f32,
    #[serde(default = "DepthBiasConfig::default_npc")]
    pub npc: f32,
    #[serde(default)]
    pub other: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::enabled")]
    pub shadows_enabled: bool,
    #[serde(default = "RenderConfig::default_highlight_scale")]
    pub highlight_scale: f32,
    #[serde(default = "RenderConfig::default_hostile_highlight")]
    pub hostile_highlight: [f32; 3],
    #[serde(default = "RenderConfig::default_friendly_highlight")]
    pub friendly_highlight: [f32; 3],
    #[serde(default = "RenderConfig::default_shadow_depth_bias")]
    pub shadow_depth_bias: f32,
    #[serde(default)]
    pub depth_bias: DepthBiasConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub lighting: LightingConfig,
    #[serde(default)]
    pub bounds: BoundsConfig,
    #[serde(default)]
    pub shaders: ShaderConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

impl AnimationConfig {
    const fn default_blend_duration() -> f32 {
        0.25
    }

    const fn default_throttle_hz() -> f32 {
        20.0
    }

    const fn default_speed() -> f32 {
        4.0
    }

    /// Minimum spacing between throttled animation invalidations.
    pub fn throttle_interval_ms(&self) -> f64 {
        if self.throttle_hz <= 0.0 {
            0.0
        } else {
            1000.0 / self.throttle_hz as f64
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            blend_duration: Self::default_blend_duration(),
            throttle_hz: Self::default_throttle_hz(),
            default_speed: Self::default_speed(),
        }
    }
}

impl LightingConfig {
    const fn default_light_change_threshold() -> f32 {
        0.01
    }

    const fn default_main_light_change_threshold() -> f32 {
        0.001
    }

    const fn default_light_check_interval_ms() -> f64 {
        50.0
    }

    const fn default_main_light_check_interval_ms() -> f64 {
        16.67
    }

    const fn default_light_sample_grid() -> f32 {
        8.0
    }

    const fn default_dynamic_ambient() -> [f32; 3] {
        [0.8, 0.8, 0.8]
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            light_change_threshold: Self::default_light_change_threshold(),
            main_light_change_threshold: Self::default_main_light_change_threshold(),
            light_check_interval_ms: Self::default_light_check_interval_ms(),
            main_light_check_interval_ms: Self::default_main_light_check_interval_ms(),
            light_sample_grid: Self::default_light_sample_grid(),
            dynamic_ambient: Self::default_dynamic_ambient(),
        }
    }
}

impl BoundsConfig {
    const fn default_update_interval() -> u32 {
        4
    }

    const fn default_max_samples_per_mesh() -> usize {
        32
    }
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            update_interval: Self::default_update_interval(),
            max_samples_per_mesh: Self::default_max_samples_per_mesh(),
        }
    }
}

impl ShaderConfig {
    const fn enabled() -> bool {
        true
    }

    const fn default_max_lights() -> usize {
        16
    }

    const fn default_integrated_max_lights() -> usize {
        4
    }

    pub fn light_budget(&self) -> usize {
        if self.optimize_for_integrated_gpu {
            self.integrated_max_lights
        } else {
            self.max_lights
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            dynamic_lighting: false,
            item_material: Self::enabled(),
            monster_material: Self::enabled(),
            optimize_for_integrated_gpu: false,
            max_lights: Self::default_max_lights(),
            integrated_max_lights: Self::default_integrated_max_lights(),
            debug_lighting_areas: false,
        }
    }
}

impl DepthBiasConfig {
    const fn default_player() -> f32 {
        -0.00001
    }

    const fn default_dropped_item() -> f32 {
        -0.00002
    }

    const fn default_npc() -> f32 {
        -0.000005
    }
}

impl Default for DepthBiasConfig {
    fn default() -> Self {
        Self {
            player: Self::default_player(),
            dropped_item: Self::default_dropped_item(),
            npc: Self::default_npc(),
            other: 0.0,
        }
    }
}

impl RenderConfig {
    const fn enabled() -> bool {
        true
    }

    const fn default_highlight_scale() -> f32 {
        0.015
    }

    const fn default_hostile_highlight() -> [f32; 3] {
        [1.0, 0.0, 0.0]
    }

    const fn default_friendly_highlight() -> [f32; 3] {
        [0.0, 1.0, 0.0]
    }

    fn default_shadow_depth_bias() -> f32 {
        -20.0 / (1u32 << 24) as f32
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            shadows_enabled: Self::enabled(),
            highlight_scale: Self::default_highlight_scale(),
            hostile_highlight: Self::default_hostile_highlight(),
            friendly_highlight: Self::default_friendly_highlight(),
            shadow_depth_bias: Self::default_shadow_depth_bias(),
            depth_bias: DepthBiasConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).context("Failed to parse engine config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_tuned_defaults() {
        let cfg = EngineConfig::from_json_str("{}").expect("parse");
        assert!((cfg.animation.blend_duration - 0.25).abs() < f32::EPSILON);
        assert!((cfg.animation.throttle_interval_ms() - 50.0).abs() < 1e-9);
        assert!((cfg.lighting.light_change_threshold - 0.01).abs() < f32::EPSILON);
        assert_eq!(cfg.bounds.update_interval, 4);
        assert_eq!(cfg.bounds.max_samples_per_mesh, 32);
        assert_eq!(cfg.shaders.light_budget(), 16);
        assert!(cfg.render.shadows_enabled);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = EngineConfig::from_json_str(
            r#"{ "animation": { "blend_duration": 0.5 }, "shaders": { "optimize_for_integrated_gpu": true } }"#,
        )
        .expect("parse");
        assert!((cfg.animation.blend_duration - 0.5).abs() < f32::EPSILON);
        assert!((cfg.animation.default_speed - 4.0).abs() < f32::EPSILON);
        assert_eq!(cfg.shaders.light_budget(), 4);
        assert!(cfg.shaders.item_material);
    }

    #[test]
    fn zero_throttle_disables_spacing() {
        let mut cfg = AnimationConfig::default();
        cfg.throttle_hz = 0.0;
        assert_eq!(cfg.throttle_interval_ms(), 0.0);
    }
}
