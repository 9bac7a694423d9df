use crate::model::{BoneKeyframeTrack, ModelAsset};
use glam::{Mat4, Vec3};

/// Interpolation tolerance when comparing two samples of the same action.
const SAMPLE_T_EPSILON: f32 = 0.001;

/// One sampled position inside an action.
#[derive(Debug, Clone, Copy)]
pub struct FrameSample {
    pub action: usize,
    pub frame0: usize,
    pub frame1: usize,
    pub t: f32,
}

impl FrameSample {
    pub fn new(action: usize, frame0: usize, frame1: usize, t: f32) -> Self {
        Self { action, frame0, frame1, t }
    }

    pub fn still(action: usize) -> Self {
        Self::new(action, 0, 0, 0.0)
    }
}

impl PartialEq for FrameSample {
    fn eq(&self, other: &Self) -> bool {
        self.action == other.action
            && self.frame0 == other.frame0
            && self.frame1 == other.frame1
            && (self.t - other.t).abs() < SAMPLE_T_EPSILON
    }
}

/// Local transform of one bone track between two frames.
///
/// Frames are clamped to the track's own sample count and equal frames skip interpolation,
/// so the result is then exactly the stored keyframe.
pub fn keyframe_local(track: &BoneKeyframeTrack, frame0: usize, frame1: usize, t: f32) -> Mat4 {
    let last = track.sample_count().saturating_sub(1);
    let f0 = frame0.min(last);
    let f1 = frame1.min(last);
    if f0 == f1 || t == 0.0 {
        return Mat4::from_rotation_translation(track.rotations[f0], track.positions[f0]);
    }
    let rotation = track.rotations[f0].slerp(track.rotations[f1], t);
    let position = track.positions[f0].lerp(track.positions[f1], t);
    Mat4::from_rotation_translation(rotation, position)
}

/// Writes one model-space matrix per bone into `out`.
///
/// Bones without data for the action come out as identity and are not composed with their
/// parent. A locked root keeps the first keyframe's X/Y and lifts Z by `body_height`.
pub fn compute_pose(model: &ModelAsset, sample: FrameSample, body_height: f32, out: &mut Vec<Mat4>) {
    out.clear();
    out.resize(model.bones.len(), Mat4::IDENTITY);
    let Some(action_index) = model.actions.len().checked_sub(1).map(|last| sample.action.min(last)) else {
        return;
    };
    let action = model.actions[action_index];
    let max_frame = action.frame_count.max(1) as usize - 1;
    let frame0 = sample.frame0.min(max_frame);
    let frame1 = sample.frame1.min(max_frame);
    let t = if frame0 == frame1 { 0.0 } else { sample.t };

    for index in 0..model.bones.len() {
        let Some(track) = model.bones[index].track(action_index) else {
            continue;
        };
        let mut local = keyframe_local(track, frame0, frame1, t);
        if index == 0 && action.lock_positions {
            let root = track.positions[0];
            let z = local.w_axis.z;
            local.w_axis = Vec3::new(root.x, root.y, z + body_height).extend(1.0);
        }
        out[index] = match model.parent_of(index) {
            Some(parent) => out[parent] * local,
            None => local,
        };
    }
}

/// Component-wise matrix interpolation used by cross-fades.
pub fn lerp_mat4(a: &Mat4, b: &Mat4, t: f32) -> Mat4 {
    Mat4::from_cols(
        a.x_axis.lerp(b.x_axis, t),
        a.y_axis.lerp(b.y_axis, t),
        a.z_axis.lerp(b.z_axis, t),
        a.w_axis.lerp(b.w_axis, t),
    )
}

/// Replaces every matrix in `target` with `lerp(from, target, ratio)`; `ratio` is clamped to [0, 1].
pub fn blend_poses(from: &[Mat4], target: &mut [Mat4], ratio: f32) {
    let ratio = ratio.clamp(0.0, 1.0);
    for (to, from) in target.iter_mut().zip(from) {
        *to = lerp_mat4(from, to, ratio);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseOutcome {
    /// Same sample as last time; nothing was computed.
    CacheHit,
    /// Computed, but every bone matched the live set.
    Unchanged,
    /// The live set was overwritten. `forced` marks static actions and first builds.
    Updated { forced: bool },
}

impl PoseOutcome {
    pub fn updated(self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

pub struct PoseRequest<'a> {
    pub sample: FrameSample,
    pub body_height: f32,
    /// Entities linked to a parent never use the sample cache.
    pub cacheable: bool,
    pub blend: Option<(&'a [Mat4], f32)>,
}

/// Computes poses into scratch storage and publishes them only when something moved.
#[derive(Default)]
pub struct PoseGenerator {
    scratch: Vec<Mat4>,
    last_sample: Option<FrameSample>,
    state_valid: bool,
    generations: u64,
    cache_hits: u64,
}

impl PoseGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self, model: &ModelAsset, request: PoseRequest<'_>, live: &mut Vec<Mat4>) -> PoseOutcome {
        if model.actions.is_empty() {
            self.state_valid = false;
            return PoseOutcome::Unchanged;
        }
        let frame_count = model.actions[request.sample.action.min(model.actions.len() - 1)].frame_count;
        let cacheable = request.cacheable && frame_count > 1;
        if cacheable
            && request.blend.is_none()
            && self.state_valid
            && self.last_sample == Some(request.sample)
            && live.len() == model.bones.len()
        {
            self.cache_hits += 1;
            return PoseOutcome::CacheHit;
        }

        compute_pose(model, request.sample, request.body_height, &mut self.scratch);
        self.generations += 1;
        if let Some((from, ratio)) = request.blend {
            blend_poses(from, &mut self.scratch, ratio);
        }

        let forced = frame_count <= 1 || !self.state_valid;
        let changed = live.len() != self.scratch.len() || live.iter().zip(&self.scratch).any(|(a, b)| a != b);
        if cacheable {
            self.last_sample = Some(request.sample);
            self.state_valid = true;
        } else if frame_count <= 1 {
            self.state_valid = true;
        }

        if changed || forced {
            live.clear();
            live.extend_from_slice(&self.scratch);
            PoseOutcome::Updated { forced }
        } else {
            PoseOutcome::Unchanged
        }
    }

    /// Forgets the cached sample so the next request rebuilds and publishes.
    pub fn invalidate(&mut self) {
        self.last_sample = None;
        self.state_valid = false;
    }

    pub fn generations(&self) -> u64 {
        self.generations
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }
}
