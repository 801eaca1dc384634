//! Fixed properties of the emulated console and of the host display rate.

/// Nominal CPU clock of the emulated SAMD21 in Hz.
pub const NOMINAL_CLOCK_HZ: u32 = 20_000_000;

/// Display rate the host targets, in frames per second.
pub const TARGET_FRAME_RATE: u32 = 30;

/// ST7735 panel width in pixels.
pub const SCREEN_WIDTH: u32 = 160;

/// ST7735 panel height in pixels.
pub const SCREEN_HEIGHT: u32 = 128;

/// Size in bytes of one RGBA frame as exposed by [`crate::Engine::frame_buffer`].
pub const FRAME_BUFFER_LEN: usize = (SCREEN_WIDTH * SCREEN_HEIGHT * 4) as usize;

/// Flash address at which program images are loaded (past the bootloader).
pub const PROGRAM_LOAD_ADDRESS: u32 = 0x4000;

/// Half-scale of the 10-bit DAC. Raw samples are `0..=1023` centred on this
/// value.
pub const AUDIO_SAMPLE_SCALE: f32 = 512.0;

/// Upper bound on cycles run in a single step.
///
/// One frame's worth of cycles at the target rate, rounded to the nearest
/// cycle (666,667 for 20 MHz at 30 fps).
#[must_use]
pub fn max_cycles_per_step() -> u32 {
    (f64::from(NOMINAL_CLOCK_HZ) / f64::from(TARGET_FRAME_RATE)).round() as u32
}

/// Convert a raw DAC sample to a float centred on zero.
#[must_use]
pub fn normalize_sample(raw: u16) -> f32 {
    f32::from(raw) / AUDIO_SAMPLE_SCALE - 1.0
}
