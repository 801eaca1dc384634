//! Merges keyboard, pointers and gamepad into the mask the engine reads.
//!
//! Keyboard and pointer state are updated by window events between ticks;
//! the gamepad is sampled when the mask is read. The result is always
//! `keyboard & pointers & gamepad`.

use std::collections::HashMap;

use meta_core::ButtonMask;
use winit::keyboard::KeyCode;

use super::ButtonSource;
use super::gamepad::GamepadPoller;
use super::keyboard::{KeyOutcome, KeyboardState};
use super::pointer;

/// Identity of one contact for as long as it stays down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerId {
    Mouse,
    Touch(u64),
}

/// Authoritative input state for the console.
pub struct InputFusion<G> {
    keyboard: KeyboardState,
    pointers: HashMap<PointerId, ButtonMask>,
    pointer_mask: ButtonMask,
    gamepad: G,
}

impl<G: GamepadPoller> InputFusion<G> {
    pub fn new(gamepad: G) -> Self {
        Self {
            keyboard: KeyboardState::new(),
            pointers: HashMap::new(),
            pointer_mask: ButtonMask::RELEASED,
            gamepad,
        }
    }

    pub fn key_down(&mut self, key: KeyCode) -> KeyOutcome {
        self.keyboard.key_down(key)
    }

    pub fn key_up(&mut self, key: KeyCode) -> KeyOutcome {
        self.keyboard.key_up(key)
    }

    /// Register a new contact at control-surface coordinates.
    pub fn pointer_down(&mut self, id: PointerId, x: f64, y: f64) {
        self.pointers.insert(id, ButtonMask::RELEASED);
        self.pointer_move(id, x, y);
    }

    /// Re-resolve a registered contact. Moves of unknown pointers (a mouse
    /// hovering with no button down) are ignored.
    pub fn pointer_move(&mut self, id: PointerId, x: f64, y: f64) {
        if let Some(mask) = self.pointers.get_mut(&id) {
            *mask = pointer::resolve(x, y);
        }
        self.recompute_pointers();
    }

    /// Forget a contact on lift or cancel.
    pub fn pointer_up(&mut self, id: PointerId) {
        self.pointers.remove(&id);
        self.recompute_pointers();
    }

    /// Drop every contact and held key, for when the window loses focus and
    /// the matching release events will never arrive.
    pub fn cancel_all(&mut self) {
        self.pointers.clear();
        self.keyboard.release_all();
        self.recompute_pointers();
    }

    fn recompute_pointers(&mut self) {
        self.pointer_mask = ButtonMask::combine(self.pointers.values().copied());
    }

    #[must_use]
    pub fn pointer_mask(&self) -> ButtonMask {
        self.pointer_mask
    }

    #[must_use]
    pub fn active_pointers(&self) -> usize {
        self.pointers.len()
    }

    /// Current authoritative mask, sampling the gamepad now.
    pub fn mask(&mut self) -> ButtonMask {
        self.keyboard.mask() & self.pointer_mask & self.gamepad.poll()
    }
}

impl<G: GamepadPoller> ButtonSource for InputFusion<G> {
    fn button_mask(&mut self) -> ButtonMask {
        self.mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::gamepad::NoGamepad;
    use crate::input::pointer::{BUTTONS, DPAD};
    use meta_core::Button;
    use proptest::prelude::*;

    /// Gamepad that replays a fixed mask.
    struct FixedPad(ButtonMask);

    impl GamepadPoller for FixedPad {
        fn poll(&mut self) -> ButtonMask {
            self.0
        }
    }

    fn fusion() -> InputFusion<NoGamepad> {
        InputFusion::new(NoGamepad)
    }

    const RIGHT: (f64, f64) = (DPAD.x + 40.0, DPAD.y);

    #[test]
    fn starts_released() {
        assert_eq!(fusion().mask(), ButtonMask::RELEASED);
    }

    #[test]
    fn pointer_down_resolves_immediately() {
        let mut input = fusion();
        input.pointer_down(PointerId::Touch(1), RIGHT.0, RIGHT.1);
        assert_eq!(input.mask().bits(), 0b1111_1011);
    }

    #[test]
    fn two_pointers_combine() {
        let mut input = fusion();
        let (_, a) = BUTTONS[0];
        input.pointer_down(PointerId::Touch(1), RIGHT.0, RIGHT.1);
        input.pointer_down(PointerId::Touch(2), a.x, a.y);
        assert_eq!(input.pointer_mask().bits(), 0b1110_1011);
    }

    #[test]
    fn sliding_off_the_dpad_releases_it() {
        let mut input = fusion();
        input.pointer_down(PointerId::Mouse, RIGHT.0, RIGHT.1);
        input.pointer_move(PointerId::Mouse, 400.0, 100.0);
        assert_eq!(input.mask(), ButtonMask::RELEASED);
        assert_eq!(input.active_pointers(), 1);
    }

    #[test]
    fn moving_unknown_pointer_is_ignored() {
        let mut input = fusion();
        input.pointer_move(PointerId::Mouse, RIGHT.0, RIGHT.1);
        assert_eq!(input.mask(), ButtonMask::RELEASED);
        assert_eq!(input.active_pointers(), 0);
    }

    #[test]
    fn lifting_one_pointer_keeps_the_other() {
        let mut input = fusion();
        let (_, b) = BUTTONS[1];
        input.pointer_down(PointerId::Touch(1), RIGHT.0, RIGHT.1);
        input.pointer_down(PointerId::Touch(2), b.x, b.y);
        input.pointer_up(PointerId::Touch(1));
        assert_eq!(input.mask(), ButtonMask::only(Button::B));
        input.pointer_up(PointerId::Touch(2));
        assert_eq!(input.mask(), ButtonMask::RELEASED);
    }

    #[test]
    fn up_of_unknown_pointer_is_harmless() {
        let mut input = fusion();
        input.pointer_down(PointerId::Touch(1), RIGHT.0, RIGHT.1);
        input.pointer_up(PointerId::Touch(9));
        assert_eq!(input.mask().bits(), 0b1111_1011);
    }

    #[test]
    fn keyboard_and_pointer_do_not_cancel_each_other() {
        let mut input = fusion();
        input.key_down(KeyCode::KeyJ);
        input.pointer_down(PointerId::Touch(1), RIGHT.0, RIGHT.1);
        input.pointer_up(PointerId::Touch(1));
        assert_eq!(input.mask(), ButtonMask::only(Button::A));
    }

    #[test]
    fn gamepad_is_sampled_at_read_time() {
        let mut input = InputFusion::new(FixedPad(ButtonMask::only(Button::Home)));
        input.key_down(KeyCode::KeyU);
        assert_eq!(input.mask(), ButtonMask::pressing(&[Button::Menu, Button::Home]));
        input.gamepad.0 = ButtonMask::RELEASED;
        assert_eq!(input.mask(), ButtonMask::only(Button::Menu));
    }

    #[test]
    fn cancel_all_releases_everything() {
        let mut input = fusion();
        input.key_down(KeyCode::ArrowUp);
        input.pointer_down(PointerId::Mouse, RIGHT.0, RIGHT.1);
        input.cancel_all();
        assert_eq!(input.mask(), ButtonMask::RELEASED);
        assert_eq!(input.active_pointers(), 0);
    }

    fn surface_point() -> impl Strategy<Value = (f64, f64)> {
        (0.0..f64::from(pointer::SURFACE_WIDTH), 0.0..f64::from(pointer::SURFACE_HEIGHT))
    }

    proptest! {
        #[test]
        fn pointer_mask_is_and_of_each_pointer(points in prop::collection::vec(surface_point(), 0..6)) {
            let mut input = fusion();
            let mut expected = ButtonMask::RELEASED;
            for (i, &(x, y)) in points.iter().enumerate() {
                input.pointer_down(PointerId::Touch(i as u64), x, y);
                expected &= pointer::resolve(x, y);
            }
            prop_assert_eq!(input.pointer_mask(), expected);
        }

        #[test]
        fn order_of_lifts_does_not_matter(
            points in prop::collection::vec(surface_point(), 1..6),
            lift in prop::collection::vec(any::<bool>(), 6),
        ) {
            let mut input = fusion();
            for (i, &(x, y)) in points.iter().enumerate() {
                input.pointer_down(PointerId::Touch(i as u64), x, y);
            }
            let mut expected = ButtonMask::RELEASED;
            for (i, &(x, y)) in points.iter().enumerate().rev() {
                if lift[i] {
                    input.pointer_up(PointerId::Touch(i as u64));
                } else {
                    expected &= pointer::resolve(x, y);
                }
            }
            prop_assert_eq!(input.pointer_mask(), expected);
        }
    }
}
