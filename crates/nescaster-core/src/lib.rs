//! Run-ahead latency reduction for the NesCaster frontend.
//!
//! The emulation core itself lives behind the [`emulation::EmulationCore`] trait.
//! This crate drives it through the speculative snapshot/replay cycle via
//! [`runahead::RunAheadController`] and adapts the run-ahead depth to the
//! measured overhead.

/// Run-ahead configuration and its validation rules.
pub mod config;

/// Capability trait implemented by emulation engines.
pub mod emulation;

/// NES standard controller buttons and ports.
pub mod input;

/// Deterministic software core used for tests and headless runs.
pub mod reference;

/// Snapshot/replay controller.
pub mod runahead;

/// Clock capability, region timing and the overhead estimator.
pub mod timing;

pub use config::{ConfigError, MAX_RUN_AHEAD_FRAMES, RunAheadConfig, SnapshotMode};
pub use emulation::{CoreError, EmulationCore, FRAME_SIZE, NES_HEIGHT, NES_WIDTH, QuickSlot};
pub use input::{Buttons, Port};
pub use runahead::{RunAheadController, RunAheadStats};
pub use timing::{Clock, FrameTimingWindow, MonotonicClock, TimingBase};
