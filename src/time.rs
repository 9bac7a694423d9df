use std::time::{Duration, Instant};

/// Snapshot of one tick handed to update and draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    pub delta_seconds: f32,
    pub total_ms: f64,
    pub frame_index: u64,
}

impl FrameTime {
    pub fn new(delta_seconds: f32, total_ms: f64, frame_index: u64) -> Self {
        Self { delta_seconds: delta_seconds.max(0.0), total_ms, frame_index }
    }

    /// Advances a synthetic clock by `delta_seconds`.
    pub fn advanced(self, delta_seconds: f32) -> Self {
        Self::new(delta_seconds, self.total_ms + delta_seconds as f64 * 1000.0, self.frame_index + 1)
    }

    pub fn total_seconds(&self) -> f32 {
        (self.total_ms * 0.001) as f32
    }
}

impl Default for FrameTime {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0)
    }
}

pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame_index: u64,
    pub delta: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, frame_index: 0, delta: Duration::from_secs_f32(0.0) }
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
        self.frame_index += 1;
        self.frame()
    }

    pub fn frame(&self) -> FrameTime {
        FrameTime::new(self.delta_seconds(), self.elapsed_ms(), self.frame_index)
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.last.duration_since(self.start).as_secs_f64() * 1000.0
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
