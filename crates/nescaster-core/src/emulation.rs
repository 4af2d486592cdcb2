use thiserror::Error;

use crate::input::{Buttons, Port};

pub const NES_WIDTH: usize = 256;
pub const NES_HEIGHT: usize = 240;
/// Size in bytes of one RGBA8 frame.
pub const FRAME_SIZE: usize = NES_WIDTH * NES_HEIGHT * 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("no rom is loaded")]
    RomNotLoaded,
    #[error("operation not supported by this core: {0}")]
    Unsupported(&'static str),
    #[error("invalid core state: {0}")]
    InvalidState(String),
    #[error("save state is corrupted: {0}")]
    CorruptState(&'static str),
}

/// Proof that the core holds a state in its fast save slot.
///
/// Returned by [`EmulationCore::quick_save`] and consumed by
/// [`EmulationCore::quick_load`]. The token is neither `Clone` nor `Copy`, so
/// a slot can be restored at most once per save.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a QuickSlot leaves the saved state unreachable"]
pub struct QuickSlot {
    generation: u64,
}

impl QuickSlot {
    /// Issues a token for the save identified by `generation`.
    ///
    /// Cores typically bump a counter on every save and reject tokens whose
    /// generation is stale.
    pub fn new(generation: u64) -> Self {
        Self { generation }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Primitive operations the run-ahead controller needs from an emulator.
///
/// Implementations are driven from a single thread. The fast save slot
/// behind [`quick_save`](Self::quick_save) belongs to the run-ahead
/// controller while run-ahead is active; nothing else may save into or load
/// from it.
pub trait EmulationCore {
    /// Advances exactly one video frame using the currently set input.
    fn step_frame(&mut self) -> Result<(), CoreError>;

    fn set_input(&mut self, port: Port, buttons: Buttons);

    /// Saves into the core's fast slot. Must not allocate.
    fn quick_save(&mut self) -> Result<QuickSlot, CoreError>;

    /// Restores the state saved when `slot` was issued. Must not allocate.
    fn quick_load(&mut self, slot: QuickSlot) -> Result<(), CoreError>;

    /// Current 256x240 RGBA8 frame. Only valid until the core is next mutated.
    fn frame_buffer(&self) -> &[u8];

    /// Serializes the full machine state into `buf`, replacing its contents,
    /// and returns the number of bytes written.
    fn save_state_into(&mut self, _buf: &mut Vec<u8>) -> Result<usize, CoreError> {
        Err(CoreError::Unsupported("save_state_into"))
    }

    fn load_state_from(&mut self, _buf: &[u8]) -> Result<(), CoreError> {
        Err(CoreError::Unsupported("load_state_from"))
    }

    fn is_rom_loaded(&self) -> bool {
        true
    }
}
