#![allow(dead_code)]

use std::cell::Cell;
use std::time::Duration;

use nescaster_core::{Buttons, Clock, CoreError, EmulationCore, Port, QuickSlot};

/// Deterministic core that records every primitive call.
///
/// Its whole state is a single accumulator folded with the held input on each
/// step, and the frame buffer is that accumulator's bytes.
#[derive(Default)]
pub struct RecordingCore {
    pub acc: u64,
    held: [u8; 2],
    frame: [u8; 8],
    slot: Option<(u64, u64, [u8; 2])>,
    generation: u64,

    pub steps: usize,
    /// Port one/two input in effect at each step.
    pub step_inputs: Vec<[u8; 2]>,
    pub set_inputs: usize,
    pub quick_saves: usize,
    pub quick_loads: usize,
    pub buffered_saves: usize,
    pub buffered_loads: usize,
    pub frame_reads: Cell<usize>,

    pub fail_quick_save: bool,
    /// Fails the n-th step (zero based) counted from now on.
    pub fail_step_at: Option<usize>,
    pub no_rom: bool,
}

impl RecordingCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primitive_calls(&self) -> usize {
        self.steps
            + self.set_inputs
            + self.quick_saves
            + self.quick_loads
            + self.buffered_saves
            + self.buffered_loads
            + self.frame_reads.get()
    }

    pub fn frame_bytes(&self) -> [u8; 8] {
        self.frame
    }
}

impl EmulationCore for RecordingCore {
    fn step_frame(&mut self) -> Result<(), CoreError> {
        if let Some(n) = self.fail_step_at {
            if n == 0 {
                self.fail_step_at = None;
                return Err(CoreError::InvalidState("injected step failure".into()));
            }
            self.fail_step_at = Some(n - 1);
        }
        self.steps += 1;
        self.step_inputs.push(self.held);
        self.acc = self
            .acc
            .wrapping_mul(31)
            .wrapping_add(u64::from(self.held[0]) + (u64::from(self.held[1]) << 8) + 1);
        self.frame = self.acc.to_le_bytes();
        Ok(())
    }

    fn set_input(&mut self, port: Port, buttons: Buttons) {
        self.set_inputs += 1;
        self.held[port.index()] = buttons.mask();
    }

    fn quick_save(&mut self) -> Result<QuickSlot, CoreError> {
        self.quick_saves += 1;
        if self.fail_quick_save {
            return Err(CoreError::RomNotLoaded);
        }
        self.generation += 1;
        self.slot = Some((self.generation, self.acc, self.held));
        Ok(QuickSlot::new(self.generation))
    }

    fn quick_load(&mut self, slot: QuickSlot) -> Result<(), CoreError> {
        self.quick_loads += 1;
        match self.slot {
            Some((generation, acc, held)) if generation == slot.generation() => {
                self.acc = acc;
                self.held = held;
                self.frame = acc.to_le_bytes();
                Ok(())
            }
            _ => Err(CoreError::InvalidState("stale quick slot".into())),
        }
    }

    fn frame_buffer(&self) -> &[u8] {
        self.frame_reads.set(self.frame_reads.get() + 1);
        &self.frame
    }

    fn save_state_into(&mut self, buf: &mut Vec<u8>) -> Result<usize, CoreError> {
        self.buffered_saves += 1;
        buf.clear();
        buf.extend_from_slice(&self.acc.to_le_bytes());
        buf.extend_from_slice(&self.held);
        Ok(buf.len())
    }

    fn load_state_from(&mut self, buf: &[u8]) -> Result<(), CoreError> {
        self.buffered_loads += 1;
        if buf.len() != 10 {
            return Err(CoreError::CorruptState("length"));
        }
        let mut acc = [0u8; 8];
        acc.copy_from_slice(&buf[..8]);
        self.acc = u64::from_le_bytes(acc);
        self.held = [buf[8], buf[9]];
        self.frame = self.acc.to_le_bytes();
        Ok(())
    }

    fn is_rom_loaded(&self) -> bool {
        !self.no_rom
    }
}

/// Clock that advances by a fixed step every time it is read.
pub struct SteppingClock {
    now: Cell<Duration>,
    step: Cell<Duration>,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            step: Cell::new(step),
        }
    }

    pub fn set_step(&self, step: Duration) {
        self.step.set(step);
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        let t = self.now.get();
        self.now.set(t + self.step.get());
        t
    }
}
