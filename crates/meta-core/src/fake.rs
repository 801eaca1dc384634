//! Recording engine for host-side tests.
//!
//! Every instance created from one [`EngineLog`] reports into it, so tests can
//! observe construction, disposal and step order across reloads.

use std::cell::RefCell;
use std::rc::Rc;

use crate::hardware::FRAME_BUFFER_LEN;
use crate::{ButtonMask, Engine, EngineError};

/// Shared record of what the host did to its engines.
#[derive(Debug, Default)]
pub struct EngineLog {
    pub created: usize,
    pub disposed: usize,
    /// `(instance id, image length, load address)` per successful load.
    pub loads: Vec<(usize, usize, u32)>,
    /// `(instance id, cycles, buttons)` per step.
    pub steps: Vec<(usize, u32, ButtonMask)>,
    /// Raw samples every step generates.
    pub audio_per_step: Vec<u16>,
    /// Refuse every load with [`EngineError::Rejected`].
    pub reject_loads: bool,
    pub sample_rate: u32,
}

impl EngineLog {
    #[must_use]
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            sample_rate: 44_100,
            ..Self::default()
        }))
    }
}

/// Engine that records its calls and fills its frame with the step count.
pub struct RecordingEngine {
    id: usize,
    log: Rc<RefCell<EngineLog>>,
    frame: Vec<u8>,
    audio: Vec<u16>,
    steps: usize,
}

impl RecordingEngine {
    #[must_use]
    pub fn new(log: &Rc<RefCell<EngineLog>>) -> Self {
        let id = {
            let mut log = log.borrow_mut();
            log.created += 1;
            log.created
        };
        Self {
            id,
            log: Rc::clone(log),
            frame: vec![0; FRAME_BUFFER_LEN],
            audio: Vec::new(),
            steps: 0,
        }
    }

    /// Factory closure suitable for a scheduler.
    pub fn factory(log: &Rc<RefCell<EngineLog>>) -> impl FnMut() -> Self + use<> {
        let log = Rc::clone(log);
        move || Self::new(&log)
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Engine for RecordingEngine {
    fn load(&mut self, program: &[u8], load_address: u32) -> Result<(), EngineError> {
        let mut log = self.log.borrow_mut();
        if log.reject_loads {
            return Err(EngineError::Rejected("fake engine refuses".into()));
        }
        log.loads.push((self.id, program.len(), load_address));
        Ok(())
    }

    fn step(&mut self, cycles: u32, buttons: ButtonMask) {
        self.steps += 1;
        self.frame.fill(self.steps as u8);
        let mut log = self.log.borrow_mut();
        log.steps.push((self.id, cycles, buttons));
        self.audio.clone_from(&log.audio_per_step);
    }

    fn frame_buffer(&self) -> &[u8] {
        &self.frame
    }

    fn audio_sample_count(&self) -> usize {
        self.audio.len()
    }

    fn audio_buffer(&self) -> &[u16] {
        &self.audio
    }

    fn native_sample_rate(&self) -> u32 {
        self.log.borrow().sample_rate
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        self.log.borrow_mut().disposed += 1;
    }
}
