//! Host runtime for a Gamebuino META emulation engine.
//!
//! This crate drives any [`meta_core::Engine`] in real time: it merges
//! keyboard, mouse/touch and gamepad input into one button mask, converts
//! display refreshes into bounded cycle budgets, presents frames on the
//! console skin, and streams the engine's audio gaplessly to the output
//! device.
//!
//! # Example
//!
//! ```ignore
//! use meta_runner::{HostConfig, RunnerConfig, run};
//!
//! fn main() -> Result<(), meta_runner::HostError> {
//!     let host = HostConfig {
//!         source: Some("game.bin".into()),
//!         ..HostConfig::default()
//!     };
//!     run(MyCore::new, RunnerConfig::default(), host)
//! }
//! ```

pub mod audio;
pub mod capture;
pub mod config;
pub mod input;
pub mod loader;
mod runner;
pub mod scheduler;
pub mod skin;
pub mod testcard;

pub use config::{Background, HostConfig};
pub use runner::{HostError, HostEvent, RunnerConfig, run, run_with_proxy};
pub use scheduler::{FrameScheduler, cycle_budget};
