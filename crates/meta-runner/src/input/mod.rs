//! Input handling for the console.
//!
//! Supports the keyboard, mouse/touch on the console art, and gamepads, all
//! merged into one active-low button mask per tick.

pub mod fusion;
pub mod gamepad;
pub mod keyboard;
pub mod pointer;

use meta_core::ButtonMask;

/// Anything that can supply the button mask for the next engine step.
pub trait ButtonSource {
    fn button_mask(&mut self) -> ButtonMask;
}

/// A fixed mask, e.g. neutral input for headless runs.
impl ButtonSource for ButtonMask {
    fn button_mask(&mut self) -> ButtonMask {
        *self
    }
}
