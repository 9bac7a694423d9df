use glam::{Vec2, Vec3};

/// Point light contributed by the world, already in 0..1 colour space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicLight {
    pub position: Vec3,
    pub color: Vec3,
    pub radius: f32,
    pub intensity: f32,
}

/// Query surface the terrain exposes to model rendering.
///
/// Terrain light is expressed in 0..255 per channel, matching vertex colour bytes.
pub trait TerrainLighting {
    fn terrain_light(&self, x: f32, y: f32) -> Vec3;
    fn dynamic_light(&self, at: Vec2) -> Vec3;
    fn terrain_height(&self, x: f32, y: f32) -> f32;
    fn active_lights(&self) -> &[DynamicLight];
}

/// Uniformly lit, level ground. Useful for tools and tests.
#[derive(Debug, Clone)]
pub struct FlatTerrain {
    pub light: Vec3,
    pub height: f32,
    pub lights: Vec<DynamicLight>,
}

impl FlatTerrain {
    pub fn new(light: Vec3, height: f32) -> Self {
        Self { light, height, lights: Vec::new() }
    }

    pub fn with_light(mut self, light: DynamicLight) -> Self {
        self.lights.push(light);
        self
    }
}

impl Default for FlatTerrain {
    fn default() -> Self {
        Self::new(Vec3::splat(255.0), 0.0)
    }
}

impl TerrainLighting for FlatTerrain {
    fn terrain_light(&self, _x: f32, _y: f32) -> Vec3 {
        self.light
    }

    /// Linear falloff of every light inside its radius, scaled to terrain units.
    fn dynamic_light(&self, at: Vec2) -> Vec3 {
        self.lights.iter().fold(Vec3::ZERO, |acc, light| {
            let distance = light.position.truncate().distance(at);
            if light.radius <= 0.0 || distance >= light.radius {
                return acc;
            }
            let falloff = 1.0 - distance / light.radius;
            acc + light.color * (light.intensity * falloff * 255.0)
        })
    }

    fn terrain_height(&self, _x: f32, _y: f32) -> f32 {
        self.height
    }

    fn active_lights(&self) -> &[DynamicLight] {
        &self.lights
    }
}

/// Grid-sampled terrain light plus the last light value that triggered a rebuild.
#[derive(Debug, Clone, Default)]
pub struct LightProbe {
    cell: Option<(i32, i32)>,
    sampled: Vec3,
    accepted: Vec3,
    last_check_ms: f64,
}

impl LightProbe {
    /// Terrain plus dynamic light at `at`, re-evaluated only when `at` enters a new grid cell.
    pub fn sample(&mut self, terrain: &dyn TerrainLighting, at: Vec3, grid: f32) -> Vec3 {
        let grid = grid.max(f32::EPSILON);
        let cell = ((at.x / grid).floor() as i32, (at.y / grid).floor() as i32);
        if self.cell != Some(cell) {
            self.sampled = terrain.terrain_light(at.x, at.y) + terrain.dynamic_light(at.truncate());
            self.cell = Some(cell);
        }
        self.sampled
    }

    /// Rate-limited change test. Returns true when `current` moved further than
    /// `threshold` (squared distance) from the last accepted value.
    pub fn check(&mut self, current: Vec3, now_ms: f64, interval_ms: f64, threshold: f32) -> bool {
        if now_ms - self.last_check_ms <= interval_ms {
            return false;
        }
        self.last_check_ms = now_ms;
        if current.distance_squared(self.accepted) > threshold {
            self.accepted = current;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
