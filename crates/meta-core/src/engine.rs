//! Engine abstraction for the emulated console.
//!
//! This module defines the `Engine` trait: the narrow contract between the
//! host (scheduler, input, audio) and a cycle-accurate emulation core. The
//! host never looks inside the engine; it only loads images, steps it, and
//! copies out what the step produced.

use thiserror::Error;

use crate::ButtonMask;

/// Reasons an engine refuses a program image.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("program image is empty")]
    EmptyProgram,

    #[error("program of {len} bytes does not fit at {address:#x} (flash is {capacity} bytes)")]
    ProgramTooLarge {
        len: usize,
        address: u32,
        capacity: usize,
    },

    #[error("program rejected: {0}")]
    Rejected(String),
}

/// Trait for emulation engines driven by the host.
///
/// The buffers returned by [`frame_buffer`](Self::frame_buffer) and
/// [`audio_buffer`](Self::audio_buffer) borrow the engine, so they cannot be
/// held across the next [`step`](Self::step).
pub trait Engine {
    /// Copy a program image into flash at `load_address` and reset the CPU.
    fn load(&mut self, program: &[u8], load_address: u32) -> Result<(), EngineError>;

    /// Advance `cycles` emulated cycles with `buttons` on the input port.
    ///
    /// Regenerates the frame and audio buffers as a side effect.
    fn step(&mut self, cycles: u32, buttons: ButtonMask);

    /// Current frame as tightly packed RGBA, `SCREEN_WIDTH * SCREEN_HEIGHT * 4`
    /// bytes.
    fn frame_buffer(&self) -> &[u8];

    /// Number of valid samples the last step generated.
    fn audio_sample_count(&self) -> usize;

    /// Raw unsigned DAC samples from the last step. Only the first
    /// [`audio_sample_count`](Self::audio_sample_count) entries are valid.
    fn audio_buffer(&self) -> &[u16];

    /// Sample rate the audio buffer is generated at, in Hz.
    fn native_sample_rate(&self) -> u32;

    /// Release the instance. Engines holding external resources override
    /// this; the default simply drops.
    fn dispose(self)
    where
        Self: Sized,
    {
    }
}
