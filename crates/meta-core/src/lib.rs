//! Core types for hosting a Gamebuino META emulation engine.
//!
//! The engine itself is opaque: it loads a program image, advances a number
//! of emulated cycles given a button state, and exposes the frame and audio
//! buffers generated by that step. This crate defines that contract
//! ([`Engine`]) together with the active-low [`ButtonMask`] the engine
//! consumes, so that hosts and engines can be built independently.

mod buttons;
mod engine;
pub mod hardware;

#[cfg(feature = "test-utils")]
pub mod fake;

pub use buttons::{Button, ButtonMask};
pub use engine::{Engine, EngineError};
