//! Speculative run-ahead.
//!
//! Every displayed frame the core first takes its authoritative step with the
//! real input. The controller then snapshots it, steps it `frame_count`
//! frames into the future with the same input, keeps the last of those frames
//! for display and rolls the core back, so the player sees the consequence of
//! a button press `frame_count` frames sooner.
//!
//! ```text
//! Idle --begin_frame--> Snapshotted --execute_run_ahead*--> Snapshotted --end_frame--> Idle
//! ```
//!
//! With `frame_count == 0` every cycle operation is a no-op. Failures from the
//! core never propagate: the cycle is skipped and counted in
//! [`RunAheadStats::skipped_cycles`].

use log::{debug, info, trace, warn};

use crate::config::{
    ConfigError, RunAheadConfig, SnapshotMode, check_frame_count, clamp_frame_count,
};
use crate::emulation::{CoreError, EmulationCore, FRAME_SIZE, QuickSlot};
use crate::input::{Buttons, Port};
use crate::timing::{Clock, FrameTimingWindow, MonotonicClock, TimingBase, overhead_percent};

/// Smallest depth that still hides any latency.
const MIN_USEFUL_FRAMES: u8 = 1;
/// Overhead, relative to the threshold, at which the minimum depth is dropped too.
const HARD_LIMIT_FACTOR: f64 = 1.2;

/// Read-only view of the controller for observers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RunAheadStats {
    pub enabled: bool,
    pub frame_count: u8,
    pub latency_reduction_ms: f64,
    pub cpu_overhead_percent: f64,
    /// Zero for [`SnapshotMode::Quick`].
    pub snapshot_size_bytes: usize,
    /// Cycles in which run-ahead had no effect because a core primitive failed
    /// or the cycle was driven out of order.
    pub skipped_cycles: u64,
    /// Times auto-throttle lowered the run-ahead depth.
    pub throttle_events: u64,
}

#[derive(Debug)]
enum Snapshot {
    Quick(QuickSlot),
    /// State lives in the controller's `state_buf`.
    Buffered,
}

pub struct RunAheadController<K: Clock = MonotonicClock> {
    config: RunAheadConfig,
    timing_base: TimingBase,
    clock: K,
    window: FrameTimingWindow,
    snapshot: Option<Snapshot>,
    state_buf: Vec<u8>,
    frame: Box<[u8]>,
    frame_len: usize,
    has_frame: bool,
    cpu_overhead_percent: f64,
    snapshot_size_bytes: usize,
    skipped_cycles: u64,
    throttle_events: u64,
}

impl RunAheadController<MonotonicClock> {
    /// Controller measuring overhead with the system monotonic clock.
    pub fn with_monotonic_clock(timing_base: TimingBase) -> Self {
        Self::new(MonotonicClock::new(), timing_base)
    }
}

impl<K: Clock> RunAheadController<K> {
    pub fn new(clock: K, timing_base: TimingBase) -> Self {
        Self::with_config(clock, timing_base, RunAheadConfig::default())
    }

    pub fn with_config(clock: K, timing_base: TimingBase, config: RunAheadConfig) -> Self {
        let mut controller = Self {
            config: RunAheadConfig::default(),
            timing_base,
            clock,
            window: FrameTimingWindow::new(),
            snapshot: None,
            state_buf: Vec::new(),
            frame: vec![0; FRAME_SIZE].into_boxed_slice(),
            frame_len: 0,
            has_frame: false,
            cpu_overhead_percent: 0.0,
            snapshot_size_bytes: 0,
            skipped_cycles: 0,
            throttle_events: 0,
        };
        controller.apply_config(config);
        controller
    }

    pub fn config(&self) -> &RunAheadConfig {
        &self.config
    }

    pub fn timing_base(&self) -> TimingBase {
        self.timing_base
    }

    pub fn set_timing_base(&mut self, timing_base: TimingBase) {
        if self.timing_base != timing_base {
            self.timing_base = timing_base;
            self.window.clear();
            self.cpu_overhead_percent = 0.0;
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.config.enabled()
    }

    #[inline]
    pub fn frame_count(&self) -> u8 {
        self.config.frame_count
    }

    pub fn has_outstanding_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Replaces the whole configuration. `frame_count` is clamped.
    pub fn apply_config(&mut self, config: RunAheadConfig) {
        let config = config.clamped();
        if config.use_secondary_instance && !self.config.use_secondary_instance {
            info!("Secondary-instance run-ahead is not available; using the single-instance path");
        }
        let depth = config.frame_count;
        self.config = RunAheadConfig {
            frame_count: self.config.frame_count,
            ..config
        };
        self.update_frame_count(depth);
    }

    /// Sets the run-ahead depth, silently clamping to `0..=MAX_RUN_AHEAD_FRAMES`.
    ///
    /// Takes effect from the next cycle; a cycle already in flight finishes
    /// with the snapshot it took.
    pub fn set_frame_count(&mut self, requested: i64) {
        self.update_frame_count(clamp_frame_count(requested));
    }

    /// Like [`set_frame_count`](Self::set_frame_count) but rejects
    /// out-of-range values instead of clamping them.
    pub fn try_set_frame_count(&mut self, requested: i64) -> Result<(), ConfigError> {
        let depth = check_frame_count(requested)?;
        self.update_frame_count(depth);
        Ok(())
    }

    /// Stores the throttle policy as given.
    pub fn set_auto_throttle(&mut self, enabled: bool, threshold_percent: f64) {
        self.config.auto_throttle = enabled;
        self.config.cpu_threshold = threshold_percent;
    }

    pub fn set_snapshot_mode(&mut self, mode: SnapshotMode) {
        self.config.snapshot_mode = mode;
        if mode == SnapshotMode::Quick {
            self.snapshot_size_bytes = 0;
        }
    }

    /// Snapshots the core ahead of this cycle's speculative frames.
    pub fn begin_frame<C: EmulationCore + ?Sized>(&mut self, core: &mut C) {
        if !self.enabled() {
            return;
        }
        if self.snapshot.is_some() {
            warn!("begin_frame called with a snapshot outstanding; keeping the earlier snapshot");
            return;
        }
        if !core.is_rom_loaded() {
            self.skip_cycle("snapshot", &CoreError::RomNotLoaded);
            return;
        }

        let taken = match self.config.snapshot_mode {
            SnapshotMode::Quick => core.quick_save().map(|slot| {
                self.snapshot_size_bytes = 0;
                Snapshot::Quick(slot)
            }),
            SnapshotMode::Buffered => core.save_state_into(&mut self.state_buf).map(|len| {
                self.snapshot_size_bytes = len;
                Snapshot::Buffered
            }),
        };

        match taken {
            Ok(snapshot) => self.snapshot = Some(snapshot),
            Err(err) => self.skip_cycle("snapshot", &err),
        }
    }

    /// Steps the core `frame_count` frames ahead with `buttons` held on both
    /// ports and returns the frame produced by the last step.
    ///
    /// Returns `None` when run-ahead is disabled, when the core has no ROM
    /// loaded, when no snapshot is outstanding, or when the core fails to step. Intermediate frames are
    /// discarded.
    pub fn execute_run_ahead<C: EmulationCore + ?Sized>(
        &mut self,
        core: &mut C,
        buttons: Buttons,
    ) -> Option<&[u8]> {
        if !self.enabled() || !core.is_rom_loaded() {
            return None;
        }
        if self.snapshot.is_none() {
            // Stepping without a snapshot would advance the real timeline.
            warn!("execute_run_ahead called without an outstanding snapshot; skipping");
            self.skipped_cycles += 1;
            return None;
        }

        let frames = self.config.frame_count;
        let start = self.clock.now();
        for _ in 0..frames {
            for port in Port::ALL {
                core.set_input(port, buttons);
            }
            if let Err(err) = core.step_frame() {
                self.skip_cycle("speculative step", &err);
                return None;
            }
        }

        let src = core.frame_buffer();
        let len = src.len().min(FRAME_SIZE);
        self.frame[..len].copy_from_slice(&src[..len]);
        self.frame_len = len;
        self.has_frame = true;

        let elapsed = self.clock.now().saturating_sub(start);
        self.window.push(elapsed);
        self.cpu_overhead_percent = self
            .window
            .overhead_percent(self.timing_base.frame_duration(), frames);
        trace!(
            "run-ahead {frames} frames took {elapsed:?} ({:.1}% overhead)",
            self.cpu_overhead_percent
        );
        self.throttle();

        Some(&self.frame[..self.frame_len])
    }

    /// Rolls the core back to the snapshot taken by [`begin_frame`](Self::begin_frame).
    ///
    /// A no-op when no snapshot is outstanding.
    pub fn end_frame<C: EmulationCore + ?Sized>(&mut self, core: &mut C) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };

        let restored = match snapshot {
            Snapshot::Quick(slot) => core.quick_load(slot),
            Snapshot::Buffered => core.load_state_from(&self.state_buf),
        };
        if let Err(err) = restored {
            warn!("Failed to restore run-ahead snapshot: {err}");
            self.skipped_cycles += 1;
        }
    }

    /// Runs one complete displayed frame: the authoritative step with
    /// `buttons`, then the speculative cycle from the state it produced.
    ///
    /// Returns the frame to present, which is the run-ahead frame when this
    /// cycle produced one and the core's own frame otherwise. The presented
    /// frame is `frame_count` frames ahead of the core.
    pub fn run_frame<'a, C: EmulationCore + ?Sized>(
        &'a mut self,
        core: &'a mut C,
        buttons: Buttons,
    ) -> Result<&'a [u8], CoreError> {
        for port in Port::ALL {
            core.set_input(port, buttons);
        }
        core.step_frame()?;

        self.begin_frame(core);
        let speculative = self.execute_run_ahead(core, buttons).is_some();
        self.end_frame(core);

        if speculative {
            Ok(&self.frame[..self.frame_len])
        } else {
            Ok(C::frame_buffer(core))
        }
    }

    /// Most recent speculative frame, if any cycle has produced one.
    pub fn last_frame(&self) -> Option<&[u8]> {
        self.has_frame.then(|| &self.frame[..self.frame_len])
    }

    pub fn stats(&self) -> RunAheadStats {
        let frame_count = self.config.frame_count;
        let enabled = frame_count > 0;
        RunAheadStats {
            enabled,
            frame_count,
            latency_reduction_ms: f64::from(frame_count) * self.timing_base.frame_duration_ms(),
            cpu_overhead_percent: if enabled {
                self.cpu_overhead_percent
            } else {
                0.0
            },
            snapshot_size_bytes: if enabled {
                self.snapshot_size_bytes
            } else {
                0
            },
            skipped_cycles: self.skipped_cycles,
            throttle_events: self.throttle_events,
        }
    }

    fn update_frame_count(&mut self, depth: u8) {
        if depth == self.config.frame_count {
            return;
        }
        debug!("Run-ahead depth {} -> {depth}", self.config.frame_count);
        self.config.frame_count = depth;
        // samples taken at another depth would skew the estimate
        self.window.clear();
        self.cpu_overhead_percent = 0.0;
    }

    fn throttle(&mut self) {
        let threshold = self.config.cpu_threshold;
        let current = self.config.frame_count;
        if !self.config.auto_throttle || current == 0 || self.cpu_overhead_percent <= threshold {
            return;
        }

        let mut next = current - 1;
        if next == MIN_USEFUL_FRAMES {
            let projected = overhead_percent(
                self.window.average(),
                self.timing_base.frame_duration(),
                next,
            );
            if projected > threshold * HARD_LIMIT_FACTOR {
                next = 0;
            }
        }

        info!(
            "Run-ahead overhead {:.1}% exceeds {threshold:.1}%; reducing depth {current} -> {next}",
            self.cpu_overhead_percent
        );
        self.throttle_events += 1;
        self.update_frame_count(next);
    }

    fn skip_cycle(&mut self, what: &str, err: &CoreError) {
        debug!("Run-ahead {what} failed: {err}; skipping this cycle");
        self.skipped_cycles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceCore;
    use std::cell::Cell;
    use std::time::Duration;

    struct FixedStepClock {
        now: Cell<Duration>,
        step: Duration,
    }

    impl FixedStepClock {
        fn new(step: Duration) -> Self {
            Self {
                now: Cell::new(Duration::ZERO),
                step,
            }
        }
    }

    impl Clock for FixedStepClock {
        fn now(&self) -> Duration {
            let t = self.now.get();
            self.now.set(t + self.step);
            t
        }
    }

    #[test]
    fn fresh_controller_is_disabled() {
        let controller =
            RunAheadController::new(FixedStepClock::new(Duration::ZERO), TimingBase::Ntsc);
        let stats = controller.stats();
        assert!(!stats.enabled);
        assert_eq!(stats.frame_count, 0);
        assert_eq!(stats.latency_reduction_ms, 0.0);
        assert_eq!(stats.cpu_overhead_percent, 0.0);
        assert!(controller.last_frame().is_none());
    }

    #[test]
    fn apply_config_clamps_depth() {
        let config = RunAheadConfig {
            frame_count: 12,
            use_secondary_instance: true,
            ..RunAheadConfig::default()
        };
        let controller = RunAheadController::with_config(
            FixedStepClock::new(Duration::ZERO),
            TimingBase::Pal,
            config,
        );
        assert_eq!(controller.frame_count(), 4);
        assert!(controller.config().use_secondary_instance);
        assert!((controller.stats().latency_reduction_ms - 4.0 * 19.9972).abs() < 0.01);
    }

    #[test]
    fn disabling_mid_cycle_still_restores() {
        let mut core = ReferenceCore::new();
        let mut controller =
            RunAheadController::new(FixedStepClock::new(Duration::ZERO), TimingBase::Ntsc);
        controller.set_frame_count(2);

        controller.begin_frame(&mut core);
        assert!(controller.has_outstanding_snapshot());
        controller.set_frame_count(0);
        assert!(controller.execute_run_ahead(&mut core, Buttons::A).is_none());
        controller.end_frame(&mut core);
        assert!(!controller.has_outstanding_snapshot());
        assert_eq!(core.frame_number(), 0);
    }

    #[test]
    fn stats_report_buffered_snapshot_size() {
        let mut core = ReferenceCore::new();
        let mut controller =
            RunAheadController::new(FixedStepClock::new(Duration::ZERO), TimingBase::Ntsc);
        controller.set_frame_count(1);
        controller.set_snapshot_mode(SnapshotMode::Buffered);

        controller.begin_frame(&mut core);
        assert_eq!(
            controller.stats().snapshot_size_bytes,
            crate::reference::STATE_LEN
        );
        controller.end_frame(&mut core);

        controller.set_snapshot_mode(SnapshotMode::Quick);
        assert_eq!(controller.stats().snapshot_size_bytes, 0);
    }
}
