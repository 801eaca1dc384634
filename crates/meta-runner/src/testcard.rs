//! Diagnostic engine built into the binary.
//!
//! Runs no code. It draws a colour ramp that scrolls with the cycles it is
//! given, shows the eight buttons along the bottom of the screen, and plays a
//! square tone while A is held, which is enough to check every path through
//! the host.

use bytemuck::{Pod, Zeroable};
use meta_core::hardware::{NOMINAL_CLOCK_HZ, SCREEN_HEIGHT, SCREEN_WIDTH};
use meta_core::{Button, ButtonMask, Engine, EngineError};

/// Flash size of the console (256 KiB).
const FLASH_SIZE: usize = 256 * 1024;

const SAMPLE_RATE: u32 = 44_100;
const TONE_HZ: u32 = 440;
const TONE_AMPLITUDE: u16 = 160;
const DAC_MIDPOINT: u16 = 512;

const INDICATOR_SIZE: u32 = 12;
const INDICATOR_Y: u32 = SCREEN_HEIGHT - INDICATOR_SIZE - 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
struct Pixel {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl Pixel {
    const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }
}

const HELD: Pixel = Pixel::rgb(0xff, 0xff, 0xff);
const IDLE: Pixel = Pixel::rgb(0x30, 0x30, 0x30);

pub struct TestCard {
    frame: Vec<Pixel>,
    audio: Vec<u16>,
    /// Derived from the loaded image so different programs look different.
    hue: u8,
    cycles: u64,
    /// Sub-sample remainder carried between steps, in cycle·Hz units.
    sample_remainder: u64,
    tone_phase: u32,
}

impl TestCard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frame: vec![Pixel::zeroed(); (SCREEN_WIDTH * SCREEN_HEIGHT) as usize],
            audio: Vec::new(),
            hue: 0,
            cycles: 0,
            sample_remainder: 0,
            tone_phase: 0,
        }
    }

    fn draw_ramp(&mut self) {
        // One full scroll per second of emulated time.
        let offset = (self.cycles * u64::from(SCREEN_HEIGHT) / u64::from(NOMINAL_CLOCK_HZ)) as u32;
        for y in 0..SCREEN_HEIGHT {
            let shade = (((y + offset) % SCREEN_HEIGHT) * 2) as u8;
            let colour = Pixel::rgb(shade, shade.wrapping_add(self.hue), self.hue);
            let row = (y * SCREEN_WIDTH) as usize;
            self.frame[row..row + SCREEN_WIDTH as usize].fill(colour);
        }
    }

    fn draw_buttons(&mut self, buttons: ButtonMask) {
        let spacing = SCREEN_WIDTH / Button::ALL.len() as u32;
        for (i, &button) in Button::ALL.iter().enumerate() {
            let colour = if buttons.is_pressed(button) { HELD } else { IDLE };
            let x0 = i as u32 * spacing + (spacing - INDICATOR_SIZE) / 2;
            for y in INDICATOR_Y..INDICATOR_Y + INDICATOR_SIZE {
                let row = (y * SCREEN_WIDTH) as usize;
                self.frame[row + x0 as usize..row + (x0 + INDICATOR_SIZE) as usize].fill(colour);
            }
        }
    }

    fn generate_audio(&mut self, cycles: u32, tone: bool) {
        self.sample_remainder += u64::from(cycles) * u64::from(SAMPLE_RATE);
        let count = (self.sample_remainder / u64::from(NOMINAL_CLOCK_HZ)) as usize;
        self.sample_remainder %= u64::from(NOMINAL_CLOCK_HZ);

        self.audio.clear();
        let half_period = SAMPLE_RATE / TONE_HZ / 2;
        for _ in 0..count {
            let sample = if !tone {
                DAC_MIDPOINT
            } else if self.tone_phase < half_period {
                DAC_MIDPOINT + TONE_AMPLITUDE
            } else {
                DAC_MIDPOINT - TONE_AMPLITUDE
            };
            self.tone_phase = (self.tone_phase + 1) % (2 * half_period);
            self.audio.push(sample);
        }
    }
}

impl Default for TestCard {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for TestCard {
    fn load(&mut self, program: &[u8], load_address: u32) -> Result<(), EngineError> {
        if program.is_empty() {
            return Err(EngineError::EmptyProgram);
        }
        let capacity = FLASH_SIZE.saturating_sub(load_address as usize);
        if program.len() > capacity {
            return Err(EngineError::ProgramTooLarge {
                len: program.len(),
                address: load_address,
                capacity,
            });
        }
        self.hue = program.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        self.cycles = 0;
        self.sample_remainder = 0;
        self.tone_phase = 0;
        Ok(())
    }

    fn step(&mut self, cycles: u32, buttons: ButtonMask) {
        self.cycles += u64::from(cycles);
        self.draw_ramp();
        self.draw_buttons(buttons);
        self.generate_audio(cycles, buttons.is_pressed(Button::A));
    }

    fn frame_buffer(&self) -> &[u8] {
        bytemuck::cast_slice(&self.frame)
    }

    fn audio_sample_count(&self) -> usize {
        self.audio.len()
    }

    fn audio_buffer(&self) -> &[u16] {
        &self.audio
    }

    fn native_sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}
