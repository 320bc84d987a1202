use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tick {
    pub should_render: bool,
    /// Seconds since the previous rendered frame; zero when not rendering.
    pub delta: f32,
}

/// Paces the frame loop at a fixed rate independent of how often the
/// windowing layer calls back. Missed frames are not replayed: a late tick
/// renders once with the full elapsed time as its delta.
#[derive(Debug)]
pub struct FrameClock {
    fps: f32,
    frame_count: u64,
    last_tick: Instant,
    last_render: Instant,
    accumulator: Duration,
    frame_intervals: VecDeque<Duration>,
    max_intervals: usize,
}

impl FrameClock {
    pub fn new(fps: f32) -> Self {
        Self::with_start(fps, Instant::now())
    }

    pub fn with_start(fps: f32, now: Instant) -> Self {
        Self {
            fps: fps.max(1.0),
            frame_count: 0,
            last_tick: now,
            last_render: now,
            accumulator: Duration::ZERO,
            frame_intervals: VecDeque::new(),
            max_intervals: 90,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.fps)
    }

    pub fn average_fps(&self) -> f32 {
        if self.frame_intervals.is_empty() {
            return 0.0;
        }

        let sum: Duration = self.frame_intervals.iter().copied().sum();
        let avg = sum / self.frame_intervals.len() as u32;

        if avg.is_zero() {
            return 0.0;
        }

        1.0 / avg.as_secs_f32()
    }

    pub fn tick(&mut self, now: Instant) -> Tick {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.accumulator += elapsed;

        let frame_duration = self.frame_duration();
        if self.accumulator < frame_duration {
            return Tick::default();
        }

        // Drop whole frames of debt, keep the remainder for phase.
        let debt = self.accumulator.as_nanos() % frame_duration.as_nanos();
        self.accumulator = Duration::from_nanos(debt as u64);

        let interval = now.saturating_duration_since(self.last_render);
        self.last_render = now;
        self.frame_count += 1;
        self.record_interval(interval);

        Tick {
            should_render: true,
            delta: interval.as_secs_f32(),
        }
    }

    fn record_interval(&mut self, interval: Duration) {
        self.frame_intervals.push_back(interval);
        if self.frame_intervals.len() > self.max_intervals {
            self.frame_intervals.pop_front();
        }
    }
}
