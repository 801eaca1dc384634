//! Touch and mouse hit-testing against the console art.
//!
//! Coordinates are in control-surface pixels (788×428, origin top-left). The
//! D-pad is a disc split into eight π/4 sectors; the four round buttons are
//! plain hit circles. All distance checks compare squared distances with a
//! strict `<`, so a point exactly on a rim is outside.

use std::f64::consts::PI;

use meta_core::{Button, ButtonMask};

/// Control surface size in pixels.
pub const SURFACE_WIDTH: u32 = 788;
pub const SURFACE_HEIGHT: u32 = 428;

/// A round hit region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl Circle {
    const fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { x, y, radius }
    }

    /// Strictly inside, using squared distance.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let dx = x - self.x;
        let dy = y - self.y;
        dx * dx + dy * dy < self.radius * self.radius
    }
}

pub const DPAD: Circle = Circle::new(109.0, 206.0, 87.0);

const BUTTON_RADIUS: f64 = 40.0;

/// Face and system buttons, tested in this order after the D-pad.
pub const BUTTONS: [(Button, Circle); 4] = [
    (Button::A, Circle::new(639.0, 223.0, BUTTON_RADIUS)),
    (Button::B, Circle::new(716.0, 189.0, BUTTON_RADIUS)),
    (Button::Menu, Circle::new(287.0, 372.0, BUTTON_RADIUS)),
    (Button::Home, Circle::new(495.0, 372.0, BUTTON_RADIUS)),
];

/// Upper sector bounds, scanned in order; the first `angle < bound` wins.
/// Angles at or past 7π/8 fall through to [`WRAP_MASK`].
const SECTORS: [(f64, u8); 8] = [
    (-7.0 * PI / 8.0, 0b1111_1101), // left
    (-5.0 * PI / 8.0, 0b1111_1100), // down + left
    (-3.0 * PI / 8.0, 0b1111_1110), // down
    (-PI / 8.0, 0b1111_1010),       // down + right
    (PI / 8.0, 0b1111_1011),        // right
    (3.0 * PI / 8.0, 0b1111_0011),  // up + right
    (5.0 * PI / 8.0, 0b1111_0111),  // up
    (7.0 * PI / 8.0, 0b1111_0101),  // up + left
];

/// Both ends of the circle point left.
const WRAP_MASK: u8 = 0b1111_1101;

/// D-pad mask for a direction angle in radians, counter-clockwise from
/// pointing right with screen-up positive.
///
/// A boundary angle belongs to the sector above it, since every bound is
/// tested with a strict `<`.
#[must_use]
pub fn sector_mask(angle: f64) -> ButtonMask {
    let bits = SECTORS
        .iter()
        .find(|&&(bound, _)| angle < bound)
        .map_or(WRAP_MASK, |&(_, bits)| bits);
    ButtonMask::from_bits(bits)
}

/// Resolve a control-surface coordinate to the buttons it holds.
///
/// Returns [`ButtonMask::RELEASED`] when nothing is hit.
#[must_use]
pub fn resolve(x: f64, y: f64) -> ButtonMask {
    if DPAD.contains(x, y) {
        // Screen Y grows downward; flip so "up" is a positive angle.
        let angle = (DPAD.y - y).atan2(x - DPAD.x);
        return sector_mask(angle);
    }

    BUTTONS
        .iter()
        .find(|(_, circle)| circle.contains(x, y))
        .map_or(ButtonMask::RELEASED, |&(button, _)| ButtonMask::only(button))
}
