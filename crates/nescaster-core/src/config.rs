use thiserror::Error;

/// Deepest supported run-ahead, in frames.
pub const MAX_RUN_AHEAD_FRAMES: u8 = 4;

const DEFAULT_CPU_THRESHOLD: f64 = 80.0;

/// How the controller captures the pre-run-ahead state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum SnapshotMode {
    /// Core-owned fast slot. Carries no payload.
    #[default]
    Quick,
    /// Serialized state copied into a buffer owned by the controller.
    Buffered,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("run-ahead frame count {requested} is outside 0..={max}", max = MAX_RUN_AHEAD_FRAMES)]
    FrameCountOutOfRange { requested: i64 },
    #[error("cpu threshold {0}% is not a finite, non-negative percentage")]
    InvalidThreshold(f64),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, rename_all = "kebab-case")
)]
pub struct RunAheadConfig {
    /// Frames to run ahead of display. Zero disables run-ahead.
    pub frame_count: u8,
    /// Reserved for a second emulator instance mode. Stored but not acted on.
    pub use_secondary_instance: bool,
    pub auto_throttle: bool,
    /// Overhead percentage above which auto-throttle reduces `frame_count`.
    pub cpu_threshold: f64,
    pub snapshot_mode: SnapshotMode,
}

impl Default for RunAheadConfig {
    fn default() -> Self {
        Self {
            frame_count: 0,
            use_secondary_instance: false,
            auto_throttle: true,
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
            snapshot_mode: SnapshotMode::Quick,
        }
    }
}

impl RunAheadConfig {
    #[inline]
    pub fn enabled(&self) -> bool {
        self.frame_count > 0
    }

    /// Returns a copy with `frame_count` pulled into the supported range.
    pub fn clamped(&self) -> Self {
        Self {
            frame_count: self.frame_count.min(MAX_RUN_AHEAD_FRAMES),
            ..self.clone()
        }
    }

    /// Strict check for callers that prefer rejecting bad input over clamping.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_frame_count(i64::from(self.frame_count))?;
        if !self.cpu_threshold.is_finite() || self.cpu_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.cpu_threshold));
        }
        Ok(())
    }
}

pub(crate) fn clamp_frame_count(requested: i64) -> u8 {
    requested.clamp(0, i64::from(MAX_RUN_AHEAD_FRAMES)) as u8
}

pub(crate) fn check_frame_count(requested: i64) -> Result<u8, ConfigError> {
    if (0..=i64::from(MAX_RUN_AHEAD_FRAMES)).contains(&requested) {
        Ok(requested as u8)
    } else {
        Err(ConfigError::FrameCountOutOfRange { requested })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_disabled() {
        let cfg = RunAheadConfig::default();
        assert_eq!(cfg.frame_count, 0);
        assert!(!cfg.enabled());
        assert!(!cfg.use_secondary_instance);
        assert_eq!(cfg.snapshot_mode, SnapshotMode::Quick);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn clamp_covers_both_ends() {
        assert_eq!(clamp_frame_count(-3), 0);
        assert_eq!(clamp_frame_count(0), 0);
        assert_eq!(clamp_frame_count(3), 3);
        assert_eq!(clamp_frame_count(i64::MAX), MAX_RUN_AHEAD_FRAMES);

        let cfg = RunAheadConfig {
            frame_count: 9,
            ..RunAheadConfig::default()
        };
        assert_eq!(cfg.clamped().frame_count, MAX_RUN_AHEAD_FRAMES);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let cfg = RunAheadConfig {
            frame_count: 5,
            ..RunAheadConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::FrameCountOutOfRange { requested: 5 })
        );

        let cfg = RunAheadConfig {
            cpu_threshold: f64::NAN,
            ..RunAheadConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
        assert_eq!(
            check_frame_count(-1),
            Err(ConfigError::FrameCountOutOfRange { requested: -1 })
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn toml_round_trip_keeps_reserved_flag() {
        let cfg = RunAheadConfig {
            frame_count: 2,
            use_secondary_instance: true,
            auto_throttle: false,
            cpu_threshold: 65.5,
            snapshot_mode: SnapshotMode::Buffered,
        };
        let text = toml::to_string(&cfg).expect("serialize");
        assert!(text.contains("use-secondary-instance = true"));
        let back: RunAheadConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(back, cfg);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let back: RunAheadConfig = toml::from_str("frame-count = 1\n").expect("deserialize");
        assert_eq!(back.frame_count, 1);
        assert!(back.auto_throttle);
        assert_eq!(back.cpu_threshold, DEFAULT_CPU_THRESHOLD);
    }
}
