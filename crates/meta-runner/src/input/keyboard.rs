//! Host keyboard → console button mapping.
//!
//! Keys are physical positions, so the table works on any layout. Q and Z
//! are listed as extra Left/Up keys for AZERTY players.
//!
//! Default mapping:
//! - S / ↓ → Down
//! - A / Q / ← → Left
//! - D / → → Right
//! - W / Z / ↑ → Up
//! - J → A, K → B
//! - U → Menu, I → Home

use meta_core::{Button, ButtonMask};
use winit::keyboard::KeyCode;

/// Logical button → accepted keys, searched in order.
const KEYMAP: [(Button, &[KeyCode]); 8] = [
    (Button::Down, &[KeyCode::KeyS, KeyCode::ArrowDown]),
    (Button::Left, &[KeyCode::KeyA, KeyCode::KeyQ, KeyCode::ArrowLeft]),
    (Button::Right, &[KeyCode::KeyD, KeyCode::ArrowRight]),
    (Button::Up, &[KeyCode::KeyW, KeyCode::KeyZ, KeyCode::ArrowUp]),
    (Button::A, &[KeyCode::KeyJ]),
    (Button::B, &[KeyCode::KeyK]),
    (Button::Menu, &[KeyCode::KeyU]),
    (Button::Home, &[KeyCode::KeyI]),
];

/// Map a host key to a console button.
///
/// Returns `None` for unmapped keys. Only the first table entry listing the
/// key is considered.
#[must_use]
pub fn map_keycode(key: KeyCode) -> Option<Button> {
    KEYMAP
        .iter()
        .find(|(_, keys)| keys.contains(&key))
        .map(|&(button, _)| button)
}

/// What a key event did to the keyboard mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Pressed(Button),
    Released(Button),
    Unmapped,
}

impl KeyOutcome {
    /// Whether the host should skip its own handling of the key.
    ///
    /// Only a mapped press is swallowed. Releases always pass through so
    /// whatever else is listening sees the key come up.
    #[must_use]
    pub fn consumes_key(self) -> bool {
        matches!(self, Self::Pressed(_))
    }
}

/// Keyboard contribution to the button state.
///
/// Aliases are not reference counted: releasing any key for a button
/// releases the button, even if another of its keys is still down.
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    mask: ButtonMask,
}

impl KeyboardState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, key: KeyCode) -> KeyOutcome {
        match map_keycode(key) {
            Some(button) => {
                self.mask = self.mask.press(button);
                KeyOutcome::Pressed(button)
            }
            None => KeyOutcome::Unmapped,
        }
    }

    pub fn key_up(&mut self, key: KeyCode) -> KeyOutcome {
        match map_keycode(key) {
            Some(button) => {
                self.mask = self.mask.release(button);
                KeyOutcome::Released(button)
            }
            None => KeyOutcome::Unmapped,
        }
    }

    /// Forget every held key, e.g. when the window loses focus and key-up
    /// events will not arrive.
    pub fn release_all(&mut self) {
        self.mask = ButtonMask::RELEASED;
    }

    #[must_use]
    pub fn mask(&self) -> ButtonMask {
        self.mask
    }
}
