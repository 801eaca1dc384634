//! Gamepad polling.
//!
//! Pads are sampled once per tick, never event-driven, and the result is not
//! remembered: a pad that disconnects mid-press simply reads as released on
//! the next tick.

use gilrs::{Axis, Button as PadButton, Event, EventType, GamepadId, Gilrs};
use meta_core::{Button, ButtonMask};

/// Stick deflection needed to count as a direction.
pub const AXIS_THRESHOLD: f32 = 0.9;

/// Source of a fresh gamepad mask.
pub trait GamepadPoller {
    /// Sample the device now. [`ButtonMask::RELEASED`] when no pad is present.
    fn poll(&mut self) -> ButtonMask;
}

/// A poller for hosts without gamepad support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGamepad;

impl GamepadPoller for NoGamepad {
    fn poll(&mut self) -> ButtonMask {
        ButtonMask::RELEASED
    }
}

/// A backend that may have failed to start.
impl<G: GamepadPoller> GamepadPoller for Option<G> {
    fn poll(&mut self) -> ButtonMask {
        self.as_mut().map_or(ButtonMask::RELEASED, GamepadPoller::poll)
    }
}

/// Raw pad state, decoupled from the gilrs handle so it can be mapped and
/// tested on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PadSnapshot {
    /// Left stick X, −1 (left) to 1 (right).
    pub stick_x: f32,
    /// Left stick Y, −1 (down) to 1 (up).
    pub stick_y: f32,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub south: bool,
    pub east: bool,
    pub west: bool,
    pub north: bool,
    pub select: bool,
    pub start: bool,
}

/// Map a pad snapshot to console buttons.
///
/// South/West act as A and East/North as B, so either hand position on a
/// four-button cluster works.
#[must_use]
pub fn map_snapshot(pad: &PadSnapshot) -> ButtonMask {
    let mut mask = ButtonMask::RELEASED;

    if pad.stick_x < -AXIS_THRESHOLD || pad.dpad_left {
        mask = mask.press(Button::Left);
    }
    if pad.stick_x > AXIS_THRESHOLD || pad.dpad_right {
        mask = mask.press(Button::Right);
    }
    if pad.stick_y > AXIS_THRESHOLD || pad.dpad_up {
        mask = mask.press(Button::Up);
    }
    if pad.stick_y < -AXIS_THRESHOLD || pad.dpad_down {
        mask = mask.press(Button::Down);
    }
    if pad.east || pad.north {
        mask = mask.press(Button::B);
    }
    if pad.south || pad.west {
        mask = mask.press(Button::A);
    }
    if pad.select {
        mask = mask.press(Button::Menu);
    }
    if pad.start {
        mask = mask.press(Button::Home);
    }

    mask
}

/// Gamepad poller backed by gilrs.
///
/// Follows the pad that most recently produced an event, falling back to
/// the first connected pad.
pub struct GilrsPoller {
    gilrs: Gilrs,
    active: Option<GamepadId>,
}

impl GilrsPoller {
    /// Returns `None` if the platform has no gamepad backend.
    #[must_use]
    pub fn new() -> Option<Self> {
        match Gilrs::new() {
            Ok(gilrs) => Some(Self {
                gilrs,
                active: None,
            }),
            Err(e) => {
                log::warn!("Gamepad support unavailable: {e}");
                None
            }
        }
    }

    fn drain_events(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    log::info!("Gamepad connected: {}", self.gilrs.gamepad(id).name());
                    self.active = Some(id);
                }
                EventType::Disconnected => {
                    log::info!("Gamepad disconnected");
                    if self.active == Some(id) {
                        self.active = None;
                    }
                }
                _ => self.active = Some(id),
            }
        }
    }

    fn snapshot(&self) -> Option<PadSnapshot> {
        let gamepad = self
            .active
            .and_then(|id| self.gilrs.connected_gamepad(id))
            .or_else(|| self.gilrs.gamepads().map(|(_, pad)| pad).find(|pad| pad.is_connected()))?;

        let axis = |axis| gamepad.axis_data(axis).map_or(0.0, |data| data.value());

        Some(PadSnapshot {
            stick_x: axis(Axis::LeftStickX),
            stick_y: axis(Axis::LeftStickY),
            dpad_up: gamepad.is_pressed(PadButton::DPadUp),
            dpad_down: gamepad.is_pressed(PadButton::DPadDown),
            dpad_left: gamepad.is_pressed(PadButton::DPadLeft),
            dpad_right: gamepad.is_pressed(PadButton::DPadRight),
            south: gamepad.is_pressed(PadButton::South),
            east: gamepad.is_pressed(PadButton::East),
            west: gamepad.is_pressed(PadButton::West),
            north: gamepad.is_pressed(PadButton::North),
            select: gamepad.is_pressed(PadButton::Select),
            start: gamepad.is_pressed(PadButton::Start),
        })
    }
}

impl GamepadPoller for GilrsPoller {
    fn poll(&mut self) -> ButtonMask {
        // gilrs only refreshes cached state while events are pumped.
        self.drain_events();
        self.snapshot()
            .map_or(ButtonMask::RELEASED, |pad| map_snapshot(&pad))
    }
}
