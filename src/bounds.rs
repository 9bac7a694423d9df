use crate::model::ModelAsset;
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Sampled model-space bounds over skinned positions.
///
/// At most `max_samples` vertices per mesh are visited, evenly strided. Vertices bound to a
/// bone outside `bones` are ignored. Returns `None` when nothing could be sampled.
pub fn sample_bounds(model: &ModelAsset, bones: &[Mat4], max_samples: usize) -> Option<Aabb> {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    let mut any = false;
    for mesh in &model.meshes {
        let count = mesh.vertices.len();
        if count == 0 {
            continue;
        }
        let step = count.div_ceil(max_samples.max(1)).max(1);
        for vertex in mesh.vertices.iter().step_by(step) {
            let Some(bone) = bones.get(vertex.bone as usize) else {
                continue;
            };
            let p = bone.transform_point3(vertex.position);
            min = min.min(p);
            max = max.max(p);
            any = true;
        }
    }
    any.then(|| Aabb::new(min, max))
}

/// Recomputes bounds on one call out of every `interval`; the first call always computes.
#[derive(Debug, Clone)]
pub struct BoundsUpdater {
    interval: u32,
    countdown: u32,
    max_samples: usize,
    local: Option<Aabb>,
}

impl BoundsUpdater {
    pub fn new(interval: u32, max_samples: usize) -> Self {
        Self { interval: interval.max(1), countdown: 0, max_samples, local: None }
    }

    pub fn local(&self) -> Option<Aabb> {
        self.local
    }

    /// Returns true when the box was recomputed on this call.
    pub fn update(&mut self, model: &ModelAsset, bones: &[Mat4]) -> bool {
        if self.countdown > 0 {
            self.countdown -= 1;
            return false;
        }
        self.countdown = self.interval - 1;
        self.force(model, bones);
        true
    }

    /// Recomputes immediately and restarts the interval.
    pub fn force(&mut self, model: &ModelAsset, bones: &[Mat4]) {
        if let Some(aabb) = sample_bounds(model, bones, self.max_samples) {
            self.local = Some(aabb);
        }
        self.countdown = self.interval - 1;
    }

    pub fn clear(&mut self) {
        self.local = None;
        self.countdown = 0;
    }
}

impl Default for BoundsUpdater {
    fn default() -> Self {
        Self::new(4, 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MeshAsset, ModelBuilder, ModelVertex};

    fn strip(count: usize, bone: u16) -> MeshAsset {
        MeshAsset {
            vertices: (0..count).map(|i| ModelVertex::new(Vec3::new(i as f32, 0.0, 0.0), bone)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn bounds_follow_bone_transforms() {
        let model = ModelBuilder::new("box").quad(None, 0, 2.0).build();
        let bones = [Mat4::from_translation(Vec3::new(10.0, 0.0, 5.0))];
        let aabb = sample_bounds(&model, &bones, 32).expect("bounds");
        assert_eq!(aabb.min, Vec3::new(9.0, -1.0, 5.0));
        assert_eq!(aabb.max, Vec3::new(11.0, 1.0, 5.0));
    }

    #[test]
    fn out_of_range_bones_are_skipped() {
        let model = ModelBuilder::new("orphan").mesh(strip(4, 3)).build();
        assert!(sample_bounds(&model, &[Mat4::IDENTITY], 32).is_none());
    }

    #[test]
    fn large_meshes_are_subsampled() {
        let model = ModelBuilder::new("long").mesh(strip(100, 0)).build();
        let aabb = sample_bounds(&model, &[Mat4::IDENTITY], 32).expect("bounds");
        // step of 4 visits 0, 4, .., 96
        assert_eq!(aabb.max.x, 96.0);
    }

    #[test]
    fn updater_runs_every_interval_calls() {
        let model = ModelBuilder::new("box").quad(None, 0, 2.0).build();
        let bones = [Mat4::IDENTITY];
        let mut updater = BoundsUpdater::new(4, 32);
        let ran: Vec<bool> = (0..9).map(|_| updater.update(&model, &bones)).collect();
        assert_eq!(ran, vec![true, false, false, false, true, false, false, false, true]);
        assert!(updater.local().is_some());
    }
}
