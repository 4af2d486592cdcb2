//! Emulation thread: owns the core and the run-ahead controller and streams
//! progress to the caller over a channel.

use crossbeam_channel as cb;
use log::{debug, warn};
use nescaster_core::reference::ReferenceCore;
use nescaster_core::{
    Buttons, FRAME_SIZE, RunAheadConfig, RunAheadController, RunAheadStats, TimingBase,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub frames: u64,
    pub region: TimingBase,
    pub run_ahead: RunAheadConfig,
    pub frame_cost: Duration,
    pub input: Buttons,
    pub report_every: u32,
    /// Pace frames to the region's refresh rate instead of running flat out.
    pub realtime: bool,
}

#[derive(Debug)]
pub enum Report {
    Progress {
        frame: u64,
        stats: RunAheadStats,
    },
    Finished {
        frames: u64,
        elapsed: Duration,
        stats: RunAheadStats,
        /// Last presented frame, RGBA.
        frame: Vec<u8>,
    },
}

pub fn spawn_session(opts: SessionOptions) -> (JoinHandle<()>, cb::Receiver<Report>) {
    let (tx, rx) = cb::bounded(16);
    let handle = thread::spawn(move || session_main(opts, tx));
    (handle, rx)
}

fn session_main(opts: SessionOptions, tx: cb::Sender<Report>) {
    let mut core = ReferenceCore::new().with_frame_cost(opts.frame_cost);
    let mut controller = RunAheadController::with_monotonic_clock(opts.region);
    controller.apply_config(opts.run_ahead.clone());

    let frame_time = opts.region.frame_duration();
    let started = Instant::now();
    let mut next_frame = started + frame_time;
    let mut presented = Vec::with_capacity(FRAME_SIZE);
    let mut frames = 0u64;

    while frames < opts.frames {
        match controller.run_frame(&mut core, opts.input) {
            Ok(frame) => {
                presented.clear();
                presented.extend_from_slice(frame);
            }
            Err(e) => {
                warn!("Core stopped after {frames} frames: {e}");
                break;
            }
        }
        frames += 1;

        if opts.report_every > 0 && frames % u64::from(opts.report_every) == 0 {
            let report = Report::Progress {
                frame: frames,
                stats: controller.stats(),
            };
            if tx.send(report).is_err() {
                debug!("Report receiver dropped; stopping session");
                return;
            }
        }

        if opts.realtime {
            while Instant::now() < next_frame {
                std::hint::spin_loop();
            }
            next_frame += frame_time;
        }
    }

    let _ = tx.send(Report::Finished {
        frames,
        elapsed: started.elapsed(),
        stats: controller.stats(),
        frame: presented,
    });
}
