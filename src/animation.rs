use crate::dirty::DirtyFlags;
use crate::model::ModelAsset;
use crate::skeleton::{compute_pose, FrameSample, PoseGenerator, PoseOutcome, PoseRequest};
use crate::time::FrameTime;
use glam::Mat4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationPhase {
    #[default]
    NotAnimating,
    SingleFrame,
    Playing,
    Blending,
}

/// Where a cross-fade takes its starting pose from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeSource {
    /// The previous action keeps playing underneath the fade.
    Action { action: usize, time: f64 },
    /// A fade was interrupted; start from the pose captured at that moment.
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct CrossFade {
    pub source: FadeSource,
    pub elapsed: f32,
    pub duration: f32,
    from_pose: Vec<Mat4>,
}

impl CrossFade {
    pub fn ratio(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }
}

/// Per-tick inputs gathered from the entity and engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct AnimationInput {
    pub action: usize,
    pub speed: f32,
    pub continuous: bool,
    pub prevent_last_frame_interpolation: bool,
    pub death_pose: bool,
    pub requires_per_frame: bool,
    pub link_parent_animation: bool,
    pub bone_linked: bool,
    pub body_height: f32,
    pub blend_duration: f32,
    pub throttle_interval_ms: f64,
}

impl Default for AnimationInput {
    fn default() -> Self {
        Self {
            action: 0,
            speed: 4.0,
            continuous: false,
            prevent_last_frame_interpolation: false,
            death_pose: false,
            requires_per_frame: false,
            link_parent_animation: false,
            bone_linked: false,
            body_height: 0.0,
            blend_duration: 0.25,
            throttle_interval_ms: 50.0,
        }
    }
}

/// Maps animation time to the two frames to interpolate between.
///
/// Death poses never move past `frame_count - 2`; looping actions wrap. Returns the possibly
/// rebased time alongside the sample.
pub fn sample_frames(
    action: usize,
    frame_count: u32,
    time: f64,
    death_pose: bool,
    prevent_last_frame_interpolation: bool,
) -> (FrameSample, f64) {
    let total = frame_count.max(1) as usize;
    let mut time = time;
    let position = if death_pose {
        let end = total.saturating_sub(2) as f64;
        time = time.min(end);
        time
    } else {
        time.rem_euclid(total as f64)
    };
    let frame0 = (position.floor() as usize).min(total - 1);
    let frame1 = (frame0 + 1) % total;
    let t = (position - frame0 as f64) as f32;
    if prevent_last_frame_interpolation && total > 1 && frame0 == total - 1 {
        time -= (total - 1) as f64;
        return (FrameSample::new(action, 0, 1, 0.0), time);
    }
    (FrameSample::new(action, frame0, frame1, t), time)
}

/// Advances one entity's animation clock and keeps its bone set current.
pub struct Animator {
    prior_action: usize,
    anim_time: f64,
    fade: Option<CrossFade>,
    generator: PoseGenerator,
    phase: AnimationPhase,
    last_invalidate_ms: f64,
    /// A throttled pose update that has not reached the buffers yet.
    pending_animation: bool,
}

impl Default for Animator {
    fn default() -> Self {
        Self::new()
    }
}

impl Animator {
    pub fn new() -> Self {
        Self {
            prior_action: 0,
            anim_time: 0.0,
            fade: None,
            generator: PoseGenerator::new(),
            phase: AnimationPhase::NotAnimating,
            last_invalidate_ms: 0.0,
            pending_animation: false,
        }
    }

    pub fn phase(&self) -> AnimationPhase {
        self.phase
    }

    pub fn anim_time(&self) -> f64 {
        self.anim_time
    }

    pub fn cross_fade(&self) -> Option<&CrossFade> {
        self.fade.as_ref()
    }

    pub fn pose_generations(&self) -> u64 {
        self.generator.generations()
    }

    pub fn pose_cache_hits(&self) -> u64 {
        self.generator.cache_hits()
    }

    /// Clears all playback state; used when the entity swaps models.
    pub fn reset(&mut self) {
        self.prior_action = 0;
        self.anim_time = 0.0;
        self.fade = None;
        self.generator.invalidate();
        self.phase = AnimationPhase::NotAnimating;
        self.pending_animation = false;
    }

    /// Builds the load-time pose (first action, first frame).
    pub fn prime(&mut self, model: &ModelAsset, live: &mut Vec<Mat4>, body_height: f32) -> bool {
        if model.actions.is_empty() {
            compute_pose(model, FrameSample::still(0), body_height, live);
            return false;
        }
        let request = PoseRequest { sample: FrameSample::still(0), body_height, cacheable: false, blend: None };
        self.generator.generate(model, request, live).updated()
    }

    /// Adopts a parent's clock so linked children stay in step.
    pub fn follow(&mut self, parent: &Animator) {
        self.anim_time = parent.anim_time;
        if let (Some(own), Some(theirs)) = (self.fade.as_mut(), parent.fade.as_ref()) {
            own.elapsed = theirs.elapsed;
        }
    }

    pub fn tick(
        &mut self,
        model: &ModelAsset,
        live: &mut Vec<Mat4>,
        input: &AnimationInput,
        frame: &FrameTime,
    ) -> DirtyFlags {
        if input.link_parent_animation || model.actions.is_empty() {
            self.phase = AnimationPhase::NotAnimating;
            return DirtyFlags::empty();
        }
        let action_index = input.action.min(model.actions.len() - 1);
        let action = model.actions[action_index];
        let delta = frame.delta_seconds;

        if action.frame_count <= 1 && !input.continuous {
            self.phase = AnimationPhase::SingleFrame;
            self.fade = None;
            if self.prior_action == action_index && live.len() == model.bones.len() {
                return self.flush_if(self.pending_animation, frame);
            }
            self.prior_action = action_index;
            let request = PoseRequest {
                sample: FrameSample::still(action_index),
                body_height: input.body_height,
                cacheable: false,
                blend: None,
            };
            let updated = self.generator.generate(model, request, live).updated();
            return self.flush_if(updated || self.pending_animation, frame);
        }

        if self.prior_action != action_index {
            self.begin_fade(model, live, input.blend_duration);
            self.anim_time = 0.0;
        }
        self.prior_action = action_index;

        self.anim_time += delta as f64 * action.effective_speed() as f64 * input.speed as f64;
        let (sample, rebased) = sample_frames(
            action_index,
            action.frame_count,
            self.anim_time,
            input.death_pose,
            input.prevent_last_frame_interpolation,
        );
        self.anim_time = rebased;

        let mut finished = false;
        if let Some(fade) = self.fade.as_mut() {
            fade.elapsed += delta;
            if let FadeSource::Action { action, time } = &mut fade.source {
                let from = model.actions[*action];
                *time += delta as f64 * from.effective_speed() as f64 * input.speed as f64;
                let (from_sample, _) = sample_frames(*action, from.frame_count, *time, false, false);
                compute_pose(model, from_sample, input.body_height, &mut fade.from_pose);
            }
            finished = fade.ratio() >= 1.0;
        }

        let request = PoseRequest {
            sample,
            body_height: input.body_height,
            cacheable: !input.bone_linked,
            blend: self.fade.as_ref().map(|fade| (fade.from_pose.as_slice(), fade.ratio())),
        };
        let outcome = self.generator.generate(model, request, live);
        let blending = self.fade.is_some();
        self.phase = if blending { AnimationPhase::Blending } else { AnimationPhase::Playing };
        if finished {
            self.fade = None;
        }

        match outcome {
            PoseOutcome::Updated { forced } if forced || blending || input.requires_per_frame => {
                self.flush_if(true, frame)
            }
            PoseOutcome::Updated { .. } => {
                if frame.total_ms - self.last_invalidate_ms > input.throttle_interval_ms {
                    self.flush_if(true, frame)
                } else {
                    self.pending_animation = true;
                    DirtyFlags::empty()
                }
            }
            // The pose settled; publish any update the throttle held back.
            PoseOutcome::Unchanged | PoseOutcome::CacheHit => self.flush_if(self.pending_animation, frame),
        }
    }

    fn flush_if(&mut self, raise: bool, frame: &FrameTime) -> DirtyFlags {
        if !raise {
            return DirtyFlags::empty();
        }
        self.pending_animation = false;
        self.last_invalidate_ms = frame.total_ms;
        DirtyFlags::ANIMATION
    }

    fn begin_fade(&mut self, model: &ModelAsset, live: &[Mat4], duration: f32) {
        let source = if self.fade.is_some() {
            FadeSource::Snapshot
        } else {
            FadeSource::Action { action: self.prior_action.min(model.actions.len() - 1), time: self.anim_time }
        };
        let mut from_pose = match self.fade.take() {
            Some(previous) => previous.from_pose,
            None => Vec::with_capacity(model.bones.len()),
        };
        from_pose.clear();
        from_pose.extend_from_slice(live);
        from_pose.resize(model.bones.len(), Mat4::IDENTITY);
        log::debug!("[animation] cross-fade from {:?} over {duration:.2}s", source);
        self.fade = Some(CrossFade { source, elapsed: 0.0, duration, from_pose });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looping_sample_wraps_to_first_frame() {
        let (sample, time) = sample_frames(0, 4, 5.5, false, false);
        assert_eq!((sample.frame0, sample.frame1), (1, 2));
        assert!((sample.t - 0.5).abs() < 1e-6);
        assert_eq!(time, 5.5);
        let (seam, _) = sample_frames(0, 4, 3.25, false, false);
        assert_eq!((seam.frame0, seam.frame1), (3, 0));
    }

    #[test]
    fn death_sample_stops_at_second_to_last() {
        let (sample, time) = sample_frames(2, 6, 40.0, true, false);
        assert_eq!(time, 4.0);
        assert_eq!((sample.frame0, sample.frame1), (4, 5));
        assert_eq!(sample.t, 0.0);
    }

    #[test]
    fn prevent_last_frame_restarts_loop() {
        let (sample, time) = sample_frames(0, 4, 3.5, false, true);
        assert_eq!((sample.frame0, sample.frame1), (0, 1));
        assert_eq!(sample.t, 0.0);
        assert!((time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn single_frame_action_has_no_next_frame() {
        let (sample, _) = sample_frames(0, 1, 0.75, false, false);
        assert_eq!((sample.frame0, sample.frame1), (0, 0));
    }

    #[test]
    fn zero_duration_fade_completes_immediately() {
        let fade = CrossFade { source: FadeSource::Snapshot, elapsed: 0.0, duration: 0.0, from_pose: Vec::new() };
        assert_eq!(fade.ratio(), 1.0);
    }
}
