use std::sync::Arc;
use std::time::{Duration, Instant};

const NTSC_FPS: f64 = 60.0988;
const PAL_FPS: f64 = 50.007;

/// Number of cycles the overhead estimator averages over.
pub const TIMING_WINDOW_CAPACITY: usize = 30;

/// Video timing of the emulated console.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum TimingBase {
    #[default]
    Ntsc,
    Pal,
}

impl TimingBase {
    #[inline]
    pub const fn frames_per_second(self) -> f64 {
        match self {
            TimingBase::Ntsc => NTSC_FPS,
            TimingBase::Pal => PAL_FPS,
        }
    }

    #[inline]
    pub fn frame_duration_ms(self) -> f64 {
        1000.0 / self.frames_per_second()
    }

    pub fn frame_duration(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frames_per_second())
    }
}

/// Monotonic time source used for overhead measurement.
///
/// Readings are offsets from an arbitrary, fixed epoch. Only differences
/// between two readings are meaningful.
pub trait Clock {
    fn now(&self) -> Duration;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// [`Clock`] backed by [`Instant`].
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Rolling window of run-ahead phase durations.
///
/// Backed by a fixed ring so recording a sample never allocates. Once full,
/// each new sample evicts the oldest one.
#[derive(Clone, Debug)]
pub struct FrameTimingWindow {
    samples: [Duration; TIMING_WINDOW_CAPACITY],
    head: usize,
    len: usize,
    total: Duration,
}

impl FrameTimingWindow {
    pub fn new() -> Self {
        Self {
            samples: [Duration::ZERO; TIMING_WINDOW_CAPACITY],
            head: 0,
            len: 0,
            total: Duration::ZERO,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        if self.len == TIMING_WINDOW_CAPACITY {
            // head points at the oldest sample once the ring is full
            self.total = self.total.saturating_sub(self.samples[self.head]);
        } else {
            self.len += 1;
        }
        self.samples[self.head] = sample;
        self.total = self.total.saturating_add(sample);
        self.head = (self.head + 1) % TIMING_WINDOW_CAPACITY;
    }

    pub fn average(&self) -> Duration {
        if self.len == 0 {
            return Duration::ZERO;
        }
        self.total / self.len as u32
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        TIMING_WINDOW_CAPACITY
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.total = Duration::ZERO;
    }

    /// Estimated CPU cost of running `frame_count` frames ahead, as a
    /// percentage of one nominal frame.
    pub fn overhead_percent(&self, frame_duration: Duration, frame_count: u8) -> f64 {
        overhead_percent(self.average(), frame_duration, frame_count)
    }
}

impl Default for FrameTimingWindow {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn overhead_percent(average: Duration, frame_duration: Duration, frame_count: u8) -> f64 {
    let nominal = frame_duration.as_secs_f64();
    if nominal <= 0.0 {
        return 0.0;
    }
    average.as_secs_f64() / nominal * 100.0 * (f64::from(frame_count) + 1.0)
}
