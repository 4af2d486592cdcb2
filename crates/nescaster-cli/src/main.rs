mod config;
mod screenshot;
mod session;

use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use nescaster_core::{Buttons, ConfigError, RunAheadConfig, SnapshotMode, TimingBase};
use std::path::PathBuf;
use std::time::Duration;

use config::CliConfig;
use session::{Report, SessionOptions};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Region {
    Ntsc,
    Pal,
}

impl From<Region> for TimingBase {
    fn from(region: Region) -> Self {
        match region {
            Region::Ntsc => TimingBase::Ntsc,
            Region::Pal => TimingBase::Pal,
        }
    }
}

/// Headless driver for the run-ahead engine
#[derive(Parser, Debug)]
#[command(name = "nescaster", version)]
struct Args {
    /// Number of frames to run
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Frames to run ahead (clamped to 0..=4)
    #[arg(long, allow_negative_numbers = true)]
    run_ahead: Option<i64>,

    /// Video timing of the emulated console
    #[arg(long, value_enum)]
    region: Option<Region>,

    /// Lower the run-ahead depth automatically under sustained overload
    #[arg(long, conflicts_with = "no_auto_throttle")]
    auto_throttle: bool,

    /// Keep the configured run-ahead depth regardless of overhead
    #[arg(long)]
    no_auto_throttle: bool,

    /// Overhead percentage that triggers auto-throttle
    #[arg(long)]
    threshold: Option<f64>,

    /// Snapshot into a controller-owned buffer instead of the core's fast slot
    #[arg(long)]
    buffered: bool,

    /// Simulated CPU cost of one emulated frame, in microseconds
    #[arg(long)]
    frame_cost_us: Option<u64>,

    /// Pace emulation to the console's refresh rate
    #[arg(long)]
    realtime: bool,

    /// Frames between progress reports (0 reports only at the end)
    #[arg(long)]
    report_every: Option<u32>,

    /// Buttons held for the whole run, as a hex mask (A=01 .. Right=80)
    #[arg(long, value_parser = parse_button_mask, default_value = "0")]
    input: u8,

    /// Path to the config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    /// Write the last presented frame as a PNG
    #[arg(long)]
    dump_frame: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn parse_button_mask(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid button mask '{s}': {e}"))
}

fn apply_overrides(cfg: &mut CliConfig, args: &Args) {
    if let Some(n) = args.run_ahead {
        cfg.run_ahead.frame_count = n.clamp(0, i64::from(u8::MAX)) as u8;
    }
    if let Some(region) = args.region {
        cfg.region = region.into();
    }
    if args.auto_throttle {
        cfg.run_ahead.auto_throttle = true;
    }
    if args.no_auto_throttle {
        cfg.run_ahead.auto_throttle = false;
    }
    if let Some(threshold) = args.threshold {
        cfg.run_ahead.cpu_threshold = threshold;
    }
    if args.buffered {
        cfg.run_ahead.snapshot_mode = SnapshotMode::Buffered;
    }
    if let Some(cost) = args.frame_cost_us {
        cfg.frame_cost_us = cost;
    }
    if let Some(every) = args.report_every {
        cfg.report_every = every;
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut cfg = config::load_from_file(&config_path);
    apply_overrides(&mut cfg, &args);

    // frame count is checked first, so a second pass only sees the threshold
    while let Err(e) = cfg.run_ahead.validate() {
        match e {
            ConfigError::FrameCountOutOfRange { .. } => {
                warn!("{e}; clamping");
                cfg.run_ahead = cfg.run_ahead.clamped();
            }
            ConfigError::InvalidThreshold(_) => {
                warn!("{e}; using the default threshold");
                cfg.run_ahead.cpu_threshold = RunAheadConfig::default().cpu_threshold;
            }
        }
    }

    if args.save_config {
        config::save_to_file(&config_path, &cfg)?;
        info!("Saved config to {}", config_path.display());
    }

    info!(
        "Running {} frames: run-ahead {} ({:?}, {:?} snapshots, auto-throttle {} at {:.1}%)",
        args.frames,
        cfg.run_ahead.frame_count,
        cfg.region,
        cfg.run_ahead.snapshot_mode,
        if cfg.run_ahead.auto_throttle { "on" } else { "off" },
        cfg.run_ahead.cpu_threshold,
    );

    let (handle, reports) = session::spawn_session(SessionOptions {
        frames: args.frames,
        region: cfg.region,
        run_ahead: cfg.run_ahead.clone(),
        frame_cost: Duration::from_micros(cfg.frame_cost_us),
        input: Buttons::from_mask(args.input),
        report_every: cfg.report_every,
        realtime: args.realtime,
    });

    let mut last_frame = None;
    for report in reports.iter() {
        match report {
            Report::Progress { frame, stats } => {
                info!(
                    "frame {frame}: depth {} latency -{:.2} ms overhead {:.1}% skipped {}",
                    stats.frame_count,
                    stats.latency_reduction_ms,
                    stats.cpu_overhead_percent,
                    stats.skipped_cycles
                );
            }
            Report::Finished {
                frames,
                elapsed,
                stats,
                frame,
            } => {
                let fps = frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
                println!("Completed {frames} frames in {elapsed:.2?} ({fps:.1} fps)");
                println!("  enabled:          {}", stats.enabled);
                println!("  frame count:      {}", stats.frame_count);
                println!("  latency saved:    {:.2} ms", stats.latency_reduction_ms);
                println!("  cpu overhead:     {:.1}%", stats.cpu_overhead_percent);
                println!("  snapshot size:    {} bytes", stats.snapshot_size_bytes);
                println!("  skipped cycles:   {}", stats.skipped_cycles);
                println!("  throttle events:  {}", stats.throttle_events);
                last_frame = Some(frame);
            }
        }
    }

    handle
        .join()
        .map_err(|_| "emulation thread panicked".to_string())?;

    if let Some(path) = args.dump_frame.as_deref() {
        match last_frame {
            Some(frame) => {
                screenshot::write_png(path, &frame)?;
                info!("Wrote {}", path.display());
            }
            None => warn!("No frame was presented; nothing written to {}", path.display()),
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_masks_parse_with_or_without_prefix() {
        assert_eq!(parse_button_mask("0x81"), Ok(0x81));
        assert_eq!(parse_button_mask("0X01"), Ok(0x01));
        assert_eq!(parse_button_mask("ff"), Ok(0xFF));
        assert!(parse_button_mask("100").is_err());
        assert!(parse_button_mask("zz").is_err());
    }

    #[test]
    fn flags_override_file_values() {
        let args = Args::parse_from([
            "nescaster",
            "--run-ahead",
            "9",
            "--region",
            "pal",
            "--no-auto-throttle",
            "--threshold",
            "55",
            "--buffered",
        ]);
        let mut cfg = CliConfig::default();
        apply_overrides(&mut cfg, &args);

        assert_eq!(cfg.region, TimingBase::Pal);
        assert!(!cfg.run_ahead.auto_throttle);
        assert_eq!(cfg.run_ahead.cpu_threshold, 55.0);
        assert_eq!(cfg.run_ahead.snapshot_mode, SnapshotMode::Buffered);
        // clamping happens after validation reports the bad value
        assert_eq!(cfg.run_ahead.frame_count, 9);
        assert!(cfg.run_ahead.validate().is_err());
        assert_eq!(cfg.run_ahead.clamped().frame_count, 4);
    }

    #[test]
    fn negative_run_ahead_disables() {
        let args = Args::parse_from(["nescaster", "--run-ahead", "-2"]);
        let mut cfg = CliConfig::default();
        cfg.run_ahead.frame_count = 3;
        apply_overrides(&mut cfg, &args);
        assert_eq!(cfg.run_ahead.frame_count, 0);
    }
}
