use crate::models::error::DeviceError;
use crate::models::state::DeviceState;

/// One mapped region of the hardware buffer, as handed out between
/// mmap-begin and mmap-commit.
///
/// `first_bit` and `step_bits` describe where the channel's samples sit:
/// the engine only accepts the plain layout of one mono 16-bit stream
/// (offset 0, 16 bits between samples).
#[derive(Debug)]
pub struct MappedArea<'a> {
    pub samples: &'a [i16],
    pub first_bit: u32,
    pub step_bits: u32,
}

impl MappedArea<'_> {
    pub fn is_contiguous(&self) -> bool {
        self.first_bit == 0 && self.step_bits == i16::BITS
    }
}

/// Interface to a capture PCM that hands out its hardware buffer directly.
///
/// Implemented by:
/// - `AlsaCapture` (Linux)
/// - scripted fakes in the engine tests
///
/// Every method maps to one driver call; recovery policy lives in
/// `CaptureEngine`, not here.
pub trait PcmDevice: Send {
    /// Current stream state.
    fn state(&self) -> DeviceState;

    /// Frames ready to be read.
    fn avail(&mut self) -> Result<usize, DeviceError>;

    /// Block until a period is ready or `timeout_ms` elapses.
    ///
    /// Returns `false` on timeout.
    fn wait(&mut self, timeout_ms: u32) -> Result<bool, DeviceError>;

    fn start(&mut self) -> Result<(), DeviceError>;

    fn prepare(&mut self) -> Result<(), DeviceError>;

    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Map up to `frames` frames, pass them to `consume`, then commit the
    /// count `consume` returns.
    ///
    /// Returns the committed count. `consume` is not called if the mapping
    /// itself fails.
    fn read_mapped(
        &mut self,
        frames: usize,
        consume: &mut dyn FnMut(MappedArea<'_>) -> usize,
    ) -> Result<usize, DeviceError>;
}
