//! Logical buttons and the active-low mask the engine reads.
//!
//! Bit `i` of a [`ButtonMask`] is 0 while [`Button`] `i` is held and 1 while
//! it is released. Masks from independent sources are merged with bitwise
//! AND: a source that asserts nothing contributes all ones and cannot cancel
//! another source's press.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign};

/// Logical button, in wire bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Down,
    Left,
    Right,
    Up,
    A,
    B,
    Menu,
    Home,
}

impl Button {
    /// All buttons, ordered by bit position.
    pub const ALL: [Self; 8] = [
        Self::Down,
        Self::Left,
        Self::Right,
        Self::Up,
        Self::A,
        Self::B,
        Self::Menu,
        Self::Home,
    ];

    /// Bit position of this button in a [`ButtonMask`].
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::Down => 0,
            Self::Left => 1,
            Self::Right => 2,
            Self::Up => 3,
            Self::A => 4,
            Self::B => 5,
            Self::Menu => 6,
            Self::Home => 7,
        }
    }
}

/// Active-low 8-bit button state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ButtonMask(u8);

impl ButtonMask {
    /// Nothing held. Identity for [`BitAnd`].
    pub const RELEASED: Self = Self(0xFF);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Mask with exactly `button` held.
    #[must_use]
    pub const fn only(button: Button) -> Self {
        Self::RELEASED.press(button)
    }

    /// Mask with every button in `buttons` held.
    #[must_use]
    pub fn pressing(buttons: &[Button]) -> Self {
        buttons.iter().fold(Self::RELEASED, |mask, &b| mask.press(b))
    }

    #[must_use]
    pub const fn press(self, button: Button) -> Self {
        Self(self.0 & !(1 << button.bit()))
    }

    #[must_use]
    pub const fn release(self, button: Button) -> Self {
        Self(self.0 | (1 << button.bit()))
    }

    #[must_use]
    pub const fn is_pressed(self, button: Button) -> bool {
        self.0 & (1 << button.bit()) == 0
    }

    /// AND-reduce any number of masks. An empty input yields [`Self::RELEASED`].
    pub fn combine<I: IntoIterator<Item = Self>>(masks: I) -> Self {
        masks.into_iter().fold(Self::RELEASED, |acc, m| acc & m)
    }
}

impl Default for ButtonMask {
    fn default() -> Self {
        Self::RELEASED
    }
}

impl BitAnd for ButtonMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for ButtonMask {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl fmt::Debug for ButtonMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ButtonMask({:#010b})", self.0)
    }
}
