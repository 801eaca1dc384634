//! Audio relay: engine samples → gapless output.
//!
//! After every step the relay copies out whatever the engine generated,
//! converts it to `f32`, and schedules it on the output device's own clock.
//! A running "next start" cursor keeps successive units back to back even
//! though video ticks and audio buffers never line up.

mod device;

pub use device::CpalSink;

use meta_core::Engine;
use meta_core::hardware::normalize_sample;

/// An output device with its own timeline, in seconds.
pub trait AudioSink {
    /// Rate the device was opened at, in Hz.
    fn sample_rate(&self) -> u32;

    /// Current playback position on the device timeline.
    fn current_time(&self) -> f64;

    /// Queue mono samples to start playing at `start` seconds.
    fn schedule(&mut self, samples: &[f32], start: f64);
}

/// One scheduled block of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledUnit {
    pub start: f64,
    pub duration: f64,
    pub len: usize,
}

impl ScheduledUnit {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Inactive,
    Active,
    /// Opening failed; stay silent until the next reload.
    Unavailable,
}

type Opener<S> = Box<dyn FnMut(u32) -> Option<S>>;

/// Relays engine audio to a lazily opened sink.
pub struct AudioRelay<S> {
    opener: Opener<S>,
    sink: Option<S>,
    activation: Activation,
    sample_rate: u32,
    next_start: f64,
    scratch: Vec<f32>,
}

impl<S: AudioSink> AudioRelay<S> {
    /// `opener` is called with the engine's native rate on activation and
    /// returns `None` when no device can be opened at that rate.
    pub fn new(opener: impl FnMut(u32) -> Option<S> + 'static) -> Self {
        Self {
            opener: Box::new(opener),
            sink: None,
            activation: Activation::Inactive,
            sample_rate: 0,
            next_start: 0.0,
            scratch: Vec::new(),
        }
    }

    /// Tear down any open device and rewind the cursor for a new program
    /// whose engine generates audio at `sample_rate`.
    pub fn reset(&mut self, sample_rate: u32) {
        if self.sink.take().is_some() {
            log::debug!("Audio device closed for reload");
        }
        self.activation = Activation::Inactive;
        self.sample_rate = sample_rate;
        self.next_start = 0.0;
    }

    /// Open the output device. Called on user input; repeated calls while
    /// active (or after the device proved unavailable) do nothing.
    pub fn activate(&mut self) {
        if self.activation != Activation::Inactive || self.sample_rate == 0 {
            return;
        }
        match (self.opener)(self.sample_rate) {
            Some(sink) => {
                log::info!("Audio output started at {} Hz", self.sample_rate);
                self.sink = Some(sink);
                self.activation = Activation::Active;
            }
            None => {
                log::debug!("No audio output at {} Hz, sound disabled", self.sample_rate);
                self.activation = Activation::Unavailable;
            }
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Device-timeline instant the next unit will start at, at the earliest.
    #[must_use]
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Drain the samples generated by the engine's last step.
    ///
    /// Returns the scheduled unit, or `None` if no device is active or the
    /// step produced no audio.
    pub fn relay<E: Engine + ?Sized>(&mut self, engine: &E) -> Option<ScheduledUnit> {
        let sink = self.sink.as_mut()?;

        let count = engine.audio_sample_count();
        if count == 0 {
            return None;
        }
        let rate = sink.sample_rate();
        if rate != engine.native_sample_rate() {
            log::warn!(
                "Audio device runs at {rate} Hz but engine generates {} Hz; dropping audio",
                engine.native_sample_rate()
            );
            return None;
        }

        let raw = engine.audio_buffer();
        let raw = &raw[..count.min(raw.len())];
        self.scratch.clear();
        self.scratch.extend(raw.iter().map(|&s| normalize_sample(s)));

        let start = sink.current_time().max(self.next_start);
        sink.schedule(&self.scratch, start);

        let duration = self.scratch.len() as f64 / f64::from(rate);
        self.next_start = start + duration;

        Some(ScheduledUnit {
            start,
            duration,
            len: self.scratch.len(),
        })
    }
}
