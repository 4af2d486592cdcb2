//! A small deterministic machine implementing [`EmulationCore`].
//!
//! It has no CPU or PPU. Each frame moves a cursor with port one's d-pad,
//! advances an LFSR and draws a test pattern, which is enough to observe
//! whether run-ahead leaks speculative state.

use std::time::{Duration, Instant};

use crate::emulation::{CoreError, EmulationCore, FRAME_SIZE, NES_HEIGHT, NES_WIDTH, QuickSlot};
use crate::input::{Buttons, Port};

const CURSOR_SIZE: usize = 8;
const LFSR_SEED: u16 = 0xACE1;
const STATE_MAGIC: [u8; 4] = *b"NCRS";
const STATE_VERSION: u8 = 1;
/// Serialized size of one [`ReferenceCore`] state.
pub const STATE_LEN: usize = 4 + 1 + 8 + 2 + 2 + 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MachineState {
    frame: u64,
    x: u8,
    y: u8,
    inputs: [u8; 2],
    lfsr: u16,
}

impl MachineState {
    fn power_on() -> Self {
        Self {
            frame: 0,
            x: ((NES_WIDTH - CURSOR_SIZE) / 2) as u8,
            y: ((NES_HEIGHT - CURSOR_SIZE) / 2) as u8,
            inputs: [0; 2],
            lfsr: LFSR_SEED,
        }
    }

    fn advance(&mut self) {
        let pad = Buttons::from_mask(self.inputs[0]);
        let max_x = (NES_WIDTH - CURSOR_SIZE) as u8;
        let max_y = (NES_HEIGHT - CURSOR_SIZE) as u8;
        if pad.contains(Buttons::LEFT) {
            self.x = self.x.saturating_sub(1);
        }
        if pad.contains(Buttons::RIGHT) {
            self.x = self.x.saturating_add(1).min(max_x);
        }
        if pad.contains(Buttons::UP) {
            self.y = self.y.saturating_sub(1);
        }
        if pad.contains(Buttons::DOWN) {
            self.y = self.y.saturating_add(1).min(max_y);
        }

        let bit = self.lfsr & 1;
        self.lfsr >>= 1;
        if bit != 0 {
            self.lfsr ^= 0xB400;
        }
        self.lfsr ^= u16::from(self.inputs[0]) | (u16::from(self.inputs[1]) << 8);
        self.frame = self.frame.wrapping_add(1);
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.extend_from_slice(&STATE_MAGIC);
        buf.push(STATE_VERSION);
        buf.extend_from_slice(&self.frame.to_le_bytes());
        buf.push(self.x);
        buf.push(self.y);
        buf.extend_from_slice(&self.inputs);
        buf.extend_from_slice(&self.lfsr.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, CoreError> {
        if buf.len() != STATE_LEN {
            return Err(CoreError::CorruptState("unexpected state length"));
        }
        if buf[0..4] != STATE_MAGIC {
            return Err(CoreError::CorruptState("bad magic"));
        }
        if buf[4] != STATE_VERSION {
            return Err(CoreError::CorruptState("unsupported state version"));
        }
        let mut frame = [0u8; 8];
        frame.copy_from_slice(&buf[5..13]);
        Ok(Self {
            frame: u64::from_le_bytes(frame),
            x: buf[13],
            y: buf[14],
            inputs: [buf[15], buf[16]],
            lfsr: u16::from_le_bytes([buf[17], buf[18]]),
        })
    }
}

#[derive(Clone)]
pub struct ReferenceCore {
    state: MachineState,
    frame: Box<[u8]>,
    slot: Option<(u64, MachineState)>,
    generation: u64,
    loaded: bool,
    frame_cost: Duration,
}

impl ReferenceCore {
    pub fn new() -> Self {
        let mut core = Self {
            state: MachineState::power_on(),
            frame: vec![0; FRAME_SIZE].into_boxed_slice(),
            slot: None,
            generation: 0,
            loaded: true,
            frame_cost: Duration::ZERO,
        };
        core.render();
        core
    }

    /// Busy-waits for `cost` inside every [`step_frame`](EmulationCore::step_frame)
    /// to stand in for the CPU time a real core would spend.
    pub fn with_frame_cost(mut self, cost: Duration) -> Self {
        self.frame_cost = cost;
        self
    }

    /// Simulates removing the cartridge. Every primitive then fails with
    /// [`CoreError::RomNotLoaded`].
    pub fn eject(&mut self) {
        self.loaded = false;
        self.slot = None;
    }

    /// Inserts a cartridge and powers the machine back on.
    pub fn insert(&mut self) {
        self.loaded = true;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.state = MachineState::power_on();
        self.slot = None;
        self.render();
    }

    pub fn frame_number(&self) -> u64 {
        self.state.frame
    }

    pub fn cursor(&self) -> (u8, u8) {
        (self.state.x, self.state.y)
    }

    fn render(&mut self) {
        let state = self.state;
        let bg = [
            (state.frame as u8).wrapping_mul(3),
            (state.lfsr >> 8) as u8,
            0x40,
            0xFF,
        ];
        let pad = Buttons::from_mask(state.inputs[0]);
        let fg = match (pad.contains(Buttons::A), pad.contains(Buttons::B)) {
            (true, true) => [0xFF, 0xFF, 0x00, 0xFF],
            (true, false) => [0xFF, 0x00, 0x00, 0xFF],
            (false, true) => [0x00, 0xFF, 0x00, 0xFF],
            (false, false) => [0xFF, 0xFF, 0xFF, 0xFF],
        };

        let cx = usize::from(state.x);
        let cy = usize::from(state.y);
        for (i, px) in self.frame.chunks_exact_mut(4).enumerate() {
            let x = i % NES_WIDTH;
            let y = i / NES_WIDTH;
            let in_cursor =
                (cx..cx + CURSOR_SIZE).contains(&x) && (cy..cy + CURSOR_SIZE).contains(&y);
            px.copy_from_slice(if in_cursor { &fg } else { &bg });
        }
    }

    fn burn_frame_cost(&self) {
        if self.frame_cost.is_zero() {
            return;
        }
        let start = Instant::now();
        while start.elapsed() < self.frame_cost {
            std::hint::spin_loop();
        }
    }
}

impl Default for ReferenceCore {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulationCore for ReferenceCore {
    fn step_frame(&mut self) -> Result<(), CoreError> {
        if !self.loaded {
            return Err(CoreError::RomNotLoaded);
        }
        self.burn_frame_cost();
        self.state.advance();
        self.render();
        Ok(())
    }

    fn set_input(&mut self, port: Port, buttons: Buttons) {
        self.state.inputs[port.index()] = buttons.mask();
    }

    fn quick_save(&mut self) -> Result<QuickSlot, CoreError> {
        if !self.loaded {
            return Err(CoreError::RomNotLoaded);
        }
        self.generation = self.generation.wrapping_add(1);
        self.slot = Some((self.generation, self.state));
        Ok(QuickSlot::new(self.generation))
    }

    fn quick_load(&mut self, slot: QuickSlot) -> Result<(), CoreError> {
        if !self.loaded {
            return Err(CoreError::RomNotLoaded);
        }
        match self.slot {
            Some((generation, saved)) if generation == slot.generation() => {
                self.state = saved;
                self.render();
                Ok(())
            }
            Some((generation, _)) => Err(CoreError::InvalidState(format!(
                "quick slot {} was overwritten by save {generation}",
                slot.generation()
            ))),
            None => Err(CoreError::InvalidState("quick slot is empty".into())),
        }
    }

    fn frame_buffer(&self) -> &[u8] {
        &self.frame
    }

    fn save_state_into(&mut self, buf: &mut Vec<u8>) -> Result<usize, CoreError> {
        if !self.loaded {
            return Err(CoreError::RomNotLoaded);
        }
        self.state.encode(buf);
        Ok(buf.len())
    }

    fn load_state_from(&mut self, buf: &[u8]) -> Result<(), CoreError> {
        if !self.loaded {
            return Err(CoreError::RomNotLoaded);
        }
        self.state = MachineState::decode(buf)?;
        self.render();
        Ok(())
    }

    fn is_rom_loaded(&self) -> bool {
        self.loaded
    }
}
