//! Real-time frame scheduler.
//!
//! Turns irregular refresh callbacks into bounded engine steps. Each tick
//! converts the wall-clock time since the previous tick into a cycle budget,
//! steps the engine with the current buttons, copies the frame out, and
//! drains the audio, strictly in that order.
//!
//! Ticks are requested through a [`TickToken`]. Loading a program cancels the
//! outstanding token before the old engine is released, so a callback that
//! was already queued for the old instance turns into a no-op.

use meta_core::hardware::{NOMINAL_CLOCK_HZ, PROGRAM_LOAD_ADDRESS, max_cycles_per_step};
use meta_core::{ButtonMask, Engine, EngineError};

use crate::audio::{AudioRelay, AudioSink, ScheduledUnit};
use crate::input::ButtonSource;

/// Handle for one scheduled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Unloaded,
    Running,
}

/// Where each finished frame goes.
pub trait DisplaySurface {
    /// Copy out one RGBA frame. The slice is only valid for this call.
    fn present(&mut self, rgba: &[u8]);
}

impl DisplaySurface for Vec<u8> {
    fn present(&mut self, rgba: &[u8]) {
        self.clear();
        self.extend_from_slice(rgba);
    }
}

/// Cycles to run for `elapsed_ms` of wall-clock time.
///
/// Clamped to `0..=max_cycles_per_step()`: a clock that went backwards runs
/// nothing, and a long stall (window hidden, debugger) runs at most one
/// frame's worth instead of trying to catch up.
#[must_use]
pub fn cycle_budget(elapsed_ms: f64) -> u32 {
    let max = max_cycles_per_step();
    if elapsed_ms.is_nan() {
        return 0;
    }
    let cycles = elapsed_ms * f64::from(NOMINAL_CLOCK_HZ) / 1000.0;
    cycles.clamp(0.0, f64::from(max)).round() as u32
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub cycles: u32,
    pub buttons: ButtonMask,
    pub audio: Option<ScheduledUnit>,
    /// Token for the following tick.
    pub next: TickToken,
}

type Factory<E> = Box<dyn FnMut() -> E>;

/// Owns the engine instance and the frame clock.
pub struct FrameScheduler<E> {
    factory: Factory<E>,
    engine: Option<E>,
    last_timestamp: Option<f64>,
    pending: Option<TickToken>,
    next_token: u64,
}

impl<E: Engine> FrameScheduler<E> {
    /// `factory` constructs a fresh engine for every load.
    pub fn new(factory: impl FnMut() -> E + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            engine: None,
            last_timestamp: None,
            pending: None,
            next_token: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.engine.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Unloaded
        }
    }

    /// The tick currently waiting to run, if any.
    #[must_use]
    pub fn pending(&self) -> Option<TickToken> {
        self.pending
    }

    #[must_use]
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Cancel the outstanding tick. Its token will be ignored.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Replace the running program.
    ///
    /// Cancels the pending tick, disposes the old engine, then constructs and
    /// loads a new one. Audio is reset to the new engine's rate.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if it rejects the image. The old engine is
    /// already gone by then: the scheduler ends [`SchedulerState::Unloaded`]
    /// with audio reset, and nothing ticks until the next successful load.
    pub fn load<S: AudioSink>(
        &mut self,
        program: &[u8],
        audio: &mut AudioRelay<S>,
    ) -> Result<TickToken, EngineError> {
        self.cancel();
        if let Some(old) = self.engine.take() {
            old.dispose();
        }
        self.last_timestamp = None;

        let mut engine = (self.factory)();
        audio.reset(engine.native_sample_rate());
        engine.load(program, PROGRAM_LOAD_ADDRESS)?;

        self.engine = Some(engine);
        Ok(self.schedule())
    }

    /// Dispose the engine and stop ticking.
    pub fn unload(&mut self) {
        self.cancel();
        if let Some(old) = self.engine.take() {
            old.dispose();
        }
        self.last_timestamp = None;
    }

    fn schedule(&mut self) -> TickToken {
        self.next_token += 1;
        let token = TickToken(self.next_token);
        self.pending = Some(token);
        token
    }

    /// Run one tick at `timestamp_ms`.
    ///
    /// Returns `None` without touching anything if `token` is stale or no
    /// program is loaded.
    pub fn tick<B, D, S>(
        &mut self,
        token: TickToken,
        timestamp_ms: f64,
        buttons: &mut B,
        display: &mut D,
        audio: &mut AudioRelay<S>,
    ) -> Option<TickReport>
    where
        B: ButtonSource + ?Sized,
        D: DisplaySurface + ?Sized,
        S: AudioSink,
    {
        if self.pending != Some(token) {
            return None;
        }
        let engine = self.engine.as_mut()?;
        self.pending = None;

        // First tick after a load runs zero cycles.
        let elapsed = self.last_timestamp.map_or(0.0, |last| timestamp_ms - last);
        self.last_timestamp = Some(timestamp_ms);
        let cycles = cycle_budget(elapsed);

        let mask = buttons.button_mask();
        engine.step(cycles, mask);
        display.present(engine.frame_buffer());
        let unit = audio.relay(&*engine);

        let next = self.schedule();
        Some(TickReport {
            cycles,
            buttons: mask,
            audio: unit,
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::audio::testing::{FakeSink, Units, fake_opener};
    use meta_core::Button;
    use meta_core::fake::{EngineLog, RecordingEngine};
    use meta_core::hardware::FRAME_BUFFER_LEN;
    use proptest::prelude::*;

    struct Rig {
        scheduler: FrameScheduler<RecordingEngine>,
        audio: AudioRelay<FakeSink>,
        log: Rc<RefCell<EngineLog>>,
        units: Units,
        display: Vec<u8>,
    }

    fn rig() -> Rig {
        let log = EngineLog::shared();
        let clock = Rc::new(Cell::new(0.0));
        let units: Units = Rc::new(RefCell::new(Vec::new()));
        let (opener, _) = fake_opener(&clock, &units);
        Rig {
            scheduler: FrameScheduler::new(RecordingEngine::factory(&log)),
            audio: AudioRelay::new(opener),
            log,
            units,
            display: Vec::new(),
        }
    }

    impl Rig {
        fn tick(&mut self, token: TickToken, ts: f64, mask: ButtonMask) -> Option<TickReport> {
            let mut buttons = mask;
            self.scheduler
                .tick(token, ts, &mut buttons, &mut self.display, &mut self.audio)
        }
    }

    #[test]
    fn sixteen_ms_at_twenty_mhz() {
        assert_eq!(cycle_budget(16.0), 320_000);
    }

    #[test]
    fn budget_clamps_to_one_frame() {
        assert_eq!(cycle_budget(1_000.0), 666_667);
        assert_eq!(cycle_budget(f64::INFINITY), 666_667);
    }

    #[test]
    fn negative_elapsed_runs_nothing() {
        assert_eq!(cycle_budget(-5.0), 0);
        assert_eq!(cycle_budget(f64::NEG_INFINITY), 0);
        assert_eq!(cycle_budget(f64::NAN), 0);
    }

    #[test]
    fn starts_unloaded_with_nothing_pending() {
        let r = rig();
        assert_eq!(r.scheduler.state(), SchedulerState::Unloaded);
        assert_eq!(r.scheduler.pending(), None);
    }

    #[test]
    fn first_tick_runs_zero_cycles() {
        let mut r = rig();
        let token = r.scheduler.load(&[1, 2, 3], &mut r.audio).unwrap();
        assert_eq!(r.scheduler.state(), SchedulerState::Running);
        let report = r.tick(token, 123_456.0, ButtonMask::RELEASED).unwrap();
        assert_eq!(report.cycles, 0);
    }

    #[test]
    fn later_ticks_use_elapsed_time() {
        let mut r = rig();
        let token = r.scheduler.load(&[1], &mut r.audio).unwrap();
        let report = r.tick(token, 1000.0, ButtonMask::RELEASED).unwrap();
        let report = r.tick(report.next, 1016.0, ButtonMask::RELEASED).unwrap();
        assert_eq!(report.cycles, 320_000);
        let report = r.tick(report.next, 1010.0, ButtonMask::RELEASED).unwrap();
        assert_eq!(report.cycles, 0);
    }

    #[test]
    fn program_is_loaded_at_flash_offset() {
        let mut r = rig();
        r.scheduler.load(&[0; 64], &mut r.audio).unwrap();
        assert_eq!(r.log.borrow().loads, vec![(1, 64, 0x4000)]);
    }

    #[test]
    fn tick_steps_with_current_buttons_then_presents() {
        let mut r = rig();
        let token = r.scheduler.load(&[1], &mut r.audio).unwrap();
        let mask = ButtonMask::only(Button::A);
        let report = r.tick(token, 0.0, mask).unwrap();
        assert_eq!(report.buttons, mask);
        assert_eq!(r.log.borrow().steps, vec![(1, 0, mask)]);
        assert_eq!(r.display.len(), FRAME_BUFFER_LEN);
        assert!(r.display.iter().all(|&b| b == 1));
    }

    #[test]
    fn stale_token_is_ignored() {
        let mut r = rig();
        let token = r.scheduler.load(&[1], &mut r.audio).unwrap();
        let report = r.tick(token, 0.0, ButtonMask::RELEASED).unwrap();
        assert_eq!(r.tick(token, 10.0, ButtonMask::RELEASED), None);
        assert!(r.tick(report.next, 10.0, ButtonMask::RELEASED).is_some());
        assert_eq!(r.log.borrow().steps.len(), 2);
    }

    #[test]
    fn cancelled_tick_does_nothing() {
        let mut r = rig();
        let token = r.scheduler.load(&[1], &mut r.audio).unwrap();
        r.scheduler.cancel();
        assert_eq!(r.tick(token, 0.0, ButtonMask::RELEASED), None);
        assert!(r.log.borrow().steps.is_empty());
    }

    #[test]
    fn reload_disposes_before_constructing() {
        let log = EngineLog::shared();
        let factory_log = Rc::clone(&log);
        let mut scheduler = FrameScheduler::new(move || {
            {
                let l = factory_log.borrow();
                assert_eq!(l.created, l.disposed, "previous engine still alive");
            }
            RecordingEngine::new(&factory_log)
        });
        let mut audio: AudioRelay<FakeSink> = AudioRelay::new(|_| None);
        scheduler.load(&[1], &mut audio).unwrap();
        scheduler.load(&[2], &mut audio).unwrap();
        scheduler.load(&[3], &mut audio).unwrap();
        assert_eq!(log.borrow().created, 3);
        assert_eq!(log.borrow().disposed, 2);
        assert_eq!(scheduler.engine().map(RecordingEngine::id), Some(3));
    }

    #[test]
    fn reload_cancels_the_old_tick_and_resets_the_clock() {
        let mut r = rig();
        let old = r.scheduler.load(&[1], &mut r.audio).unwrap();
        let report = r.tick(old, 0.0, ButtonMask::RELEASED).unwrap();
        let new = r.scheduler.load(&[2], &mut r.audio).unwrap();

        assert_eq!(r.tick(report.next, 16.0, ButtonMask::RELEASED), None);
        let report = r.tick(new, 5_000.0, ButtonMask::RELEASED).unwrap();
        assert_eq!(report.cycles, 0);
        assert_eq!(r.log.borrow().steps.last().map(|s| s.0), Some(2));
    }

    #[test]
    fn rejected_program_leaves_scheduler_unloaded() {
        let mut r = rig();
        let token = r.scheduler.load(&[1], &mut r.audio).unwrap();
        r.audio.activate();
        r.log.borrow_mut().reject_loads = true;
        assert!(r.scheduler.load(&[2], &mut r.audio).is_err());
        assert_eq!(r.scheduler.state(), SchedulerState::Unloaded);
        assert_eq!(r.scheduler.pending(), None);
        assert!(!r.audio.is_active());
        assert_eq!(r.tick(token, 0.0, ButtonMask::RELEASED), None);
        assert_eq!(r.log.borrow().disposed, 2);
    }

    #[test]
    fn audio_drains_after_the_step() {
        let mut r = rig();
        r.log.borrow_mut().audio_per_step = vec![512; 100];
        let token = r.scheduler.load(&[1], &mut r.audio).unwrap();
        r.audio.activate();
        let report = r.tick(token, 0.0, ButtonMask::RELEASED).unwrap();
        let unit = report.audio.unwrap();
        assert_eq!(unit.len, 100);
        assert_eq!(r.units.borrow().len(), 1);
    }

    #[test]
    fn reload_resets_audio_mid_playback() {
        let mut r = rig();
        r.log.borrow_mut().audio_per_step = vec![512; 441];
        let token = r.scheduler.load(&[1], &mut r.audio).unwrap();
        r.audio.activate();
        r.tick(token, 0.0, ButtonMask::RELEASED).unwrap();
        assert!(r.audio.next_start() > 0.0);

        r.scheduler.load(&[2], &mut r.audio).unwrap();
        assert!(!r.audio.is_active());
        assert!((r.audio.next_start() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unload_disposes_engine() {
        let mut r = rig();
        let token = r.scheduler.load(&[1], &mut r.audio).unwrap();
        r.scheduler.unload();
        assert_eq!(r.scheduler.state(), SchedulerState::Unloaded);
        assert_eq!(r.log.borrow().disposed, 1);
        assert_eq!(r.tick(token, 0.0, ButtonMask::RELEASED), None);
    }

    proptest! {
        #[test]
        fn budget_always_within_bounds(elapsed in prop::num::f64::ANY) {
            let cycles = cycle_budget(elapsed);
            prop_assert!(cycles <= max_cycles_per_step());
        }

        #[test]
        fn budget_monotonic_in_elapsed(a in -100.0f64..100.0, b in -100.0f64..100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(cycle_budget(lo) <= cycle_budget(hi));
        }
    }
}
