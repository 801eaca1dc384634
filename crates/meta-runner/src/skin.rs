//! Console skin: the surface the frame is presented on.
//!
//! With the console background the 160×128 frame is doubled and placed in the
//! screen window of a procedurally drawn console, whose D-pad and buttons sit
//! exactly on the pointer hit regions. With no background the surface is the
//! bare frame.

use meta_core::hardware::{FRAME_BUFFER_LEN, SCREEN_HEIGHT, SCREEN_WIDTH};

use crate::config::Background;
use crate::input::pointer::{self, BUTTONS, Circle, DPAD};
use crate::scheduler::DisplaySurface;

/// Placement of the frame on the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub screen_x: u32,
    pub screen_y: u32,
    pub scale: u32,
    /// Whether pointer contacts are resolved against the console art.
    pub pointer_regions: bool,
}

impl Layout {
    #[must_use]
    pub fn for_background(background: Background) -> Self {
        match background {
            Background::Console => Self {
                width: pointer::SURFACE_WIDTH,
                height: pointer::SURFACE_HEIGHT,
                screen_x: 232,
                screen_y: 80,
                scale: 2,
                pointer_regions: true,
            },
            Background::None => Self {
                width: SCREEN_WIDTH,
                height: SCREEN_HEIGHT,
                screen_x: 0,
                screen_y: 0,
                scale: 1,
                pointer_regions: false,
            },
        }
    }

    /// Surface size in bytes.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        (self.width * self.height * 4) as usize
    }
}

type Rgba = [u8; 4];

const BODY: Rgba = [0x2c, 0x2f, 0x38, 0xff];
const BEZEL: Rgba = [0x10, 0x10, 0x14, 0xff];
const DPAD_BASE: Rgba = [0x1c, 0x1d, 0x22, 0xff];
const DPAD_CROSS: Rgba = [0x48, 0x4b, 0x55, 0xff];
const FACE_BUTTON: Rgba = [0xd8, 0x3a, 0x3a, 0xff];
const SYSTEM_BUTTON: Rgba = [0x8a, 0x8d, 0x96, 0xff];

/// Bezel margin around the screen window, in surface pixels.
const BEZEL_MARGIN: u32 = 12;

/// Composes engine frames onto the skin.
pub struct Compositor {
    layout: Layout,
    surface: Vec<u8>,
}

impl Compositor {
    #[must_use]
    pub fn new(background: Background) -> Self {
        let layout = Layout::for_background(background);
        let mut compositor = Self {
            layout,
            surface: vec![0; layout.buffer_len()],
        };
        compositor.draw_art(background);
        compositor
    }

    /// Switch background, redrawing the art. The screen is blanked.
    pub fn relayout(&mut self, background: Background) {
        self.layout = Layout::for_background(background);
        self.surface.clear();
        self.surface.resize(self.layout.buffer_len(), 0);
        self.draw_art(background);
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The composed RGBA surface.
    #[must_use]
    pub fn surface(&self) -> &[u8] {
        &self.surface
    }

    fn draw_art(&mut self, background: Background) {
        if background == Background::None {
            return;
        }
        let Layout {
            width,
            height,
            screen_x,
            screen_y,
            scale,
            ..
        } = self.layout;

        self.fill_rect(0, 0, width, height, BODY);
        self.fill_rect(
            screen_x - BEZEL_MARGIN,
            screen_y - BEZEL_MARGIN,
            SCREEN_WIDTH * scale + 2 * BEZEL_MARGIN,
            SCREEN_HEIGHT * scale + 2 * BEZEL_MARGIN,
            BEZEL,
        );

        self.fill_circle(DPAD, DPAD_BASE);
        let arm = DPAD.radius * 0.85;
        let half = DPAD.radius * 0.3;
        self.fill_rect_f(DPAD.x - arm, DPAD.y - half, 2.0 * arm, 2.0 * half, DPAD_CROSS);
        self.fill_rect_f(DPAD.x - half, DPAD.y - arm, 2.0 * half, 2.0 * arm, DPAD_CROSS);

        for (i, &(_, circle)) in BUTTONS.iter().enumerate() {
            let colour = if i < 2 { FACE_BUTTON } else { SYSTEM_BUTTON };
            self.fill_circle(circle, colour);
        }

        // Screen starts black until the first frame.
        self.fill_rect(
            screen_x,
            screen_y,
            SCREEN_WIDTH * scale,
            SCREEN_HEIGHT * scale,
            [0, 0, 0, 0xff],
        );
    }

    fn put(&mut self, x: u32, y: u32, colour: Rgba) {
        if x < self.layout.width && y < self.layout.height {
            let i = ((y * self.layout.width + x) * 4) as usize;
            self.surface[i..i + 4].copy_from_slice(&colour);
        }
    }

    fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, colour: Rgba) {
        for py in y..y + h {
            for px in x..x + w {
                self.put(px, py, colour);
            }
        }
    }

    fn fill_rect_f(&mut self, x: f64, y: f64, w: f64, h: f64, colour: Rgba) {
        self.fill_rect(x as u32, y as u32, w as u32, h as u32, colour);
    }

    /// Fill exactly the pixels whose centres the hit test accepts.
    fn fill_circle(&mut self, circle: Circle, colour: Rgba) {
        let x0 = (circle.x - circle.radius).floor().max(0.0) as u32;
        let y0 = (circle.y - circle.radius).floor().max(0.0) as u32;
        let x1 = (circle.x + circle.radius).ceil() as u32;
        let y1 = (circle.y + circle.radius).ceil() as u32;
        for y in y0..=y1 {
            for x in x0..=x1 {
                if circle.contains(f64::from(x), f64::from(y)) {
                    self.put(x, y, colour);
                }
            }
        }
    }
}

impl DisplaySurface for Compositor {
    fn present(&mut self, rgba: &[u8]) {
        if rgba.len() != FRAME_BUFFER_LEN {
            log::warn!(
                "Engine frame is {} bytes, expected {FRAME_BUFFER_LEN}; skipped",
                rgba.len()
            );
            return;
        }
        let Layout {
            width,
            screen_x,
            screen_y,
            scale,
            ..
        } = self.layout;
        let src_stride = (SCREEN_WIDTH * 4) as usize;
        let dst_stride = (width * 4) as usize;
        let scale = scale as usize;

        for (sy, src_row) in rgba.chunks_exact(src_stride).enumerate() {
            let first = (screen_y as usize + sy * scale) * dst_stride + screen_x as usize * 4;
            let row = &mut self.surface[first..first + src_stride * scale];
            for (pixel, dst) in src_row
                .chunks_exact(4)
                .zip(row.chunks_exact_mut(4 * scale))
            {
                for out in dst.chunks_exact_mut(4) {
                    out.copy_from_slice(pixel);
                }
            }
            // Repeat the finished row for the remaining scanlines.
            for dy in 1..scale {
                let target = first + dy * dst_stride;
                self.surface
                    .copy_within(first..first + src_stride * scale, target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(c: &Compositor, x: u32, y: u32) -> Rgba {
        let i = ((y * c.layout().width + x) * 4) as usize;
        let mut out = [0; 4];
        out.copy_from_slice(&c.surface()[i..i + 4]);
        out
    }

    fn gradient() -> Vec<u8> {
        (0..FRAME_BUFFER_LEN / 4)
            .flat_map(|i| {
                let x = (i % SCREEN_WIDTH as usize) as u8;
                let y = (i / SCREEN_WIDTH as usize) as u8;
                [x, y, 7, 0xff]
            })
            .collect()
    }

    #[test]
    fn console_layout_matches_hit_surface() {
        let layout = Layout::for_background(Background::Console);
        assert_eq!((layout.width, layout.height), (788, 428));
        assert_eq!((layout.screen_x, layout.screen_y, layout.scale), (232, 80, 2));
        assert!(layout.pointer_regions);
    }

    #[test]
    fn bare_layout_is_the_frame() {
        let layout = Layout::for_background(Background::None);
        assert_eq!((layout.width, layout.height, layout.scale), (160, 128, 1));
        assert!(!layout.pointer_regions);
        assert_eq!(layout.buffer_len(), FRAME_BUFFER_LEN);
    }

    #[test]
    fn art_marks_controls() {
        let c = Compositor::new(Background::Console);
        assert_eq!(pixel(&c, 109, 206), DPAD_CROSS);
        assert_eq!(pixel(&c, 639, 223), FACE_BUTTON);
        assert_eq!(pixel(&c, 495, 372), SYSTEM_BUTTON);
        assert_eq!(pixel(&c, 5, 5), BODY);
    }

    #[test]
    fn frame_is_doubled_into_the_window() {
        let mut c = Compositor::new(Background::Console);
        c.present(&gradient());
        assert_eq!(pixel(&c, 232, 80), [0, 0, 7, 0xff]);
        assert_eq!(pixel(&c, 233, 81), [0, 0, 7, 0xff]);
        assert_eq!(pixel(&c, 234, 80), [1, 0, 7, 0xff]);
        assert_eq!(pixel(&c, 232 + 319, 80 + 255), [159, 127, 7, 0xff]);
        // Bezel just outside stays untouched.
        assert_eq!(pixel(&c, 231, 80), BEZEL);
        assert_eq!(pixel(&c, 232 + 320, 80), BEZEL);
    }

    #[test]
    fn bare_surface_is_a_copy() {
        let mut c = Compositor::new(Background::None);
        let frame = gradient();
        c.present(&frame);
        assert_eq!(c.surface(), frame.as_slice());
    }

    #[test]
    fn relayout_resizes_surface() {
        let mut c = Compositor::new(Background::Console);
        c.relayout(Background::None);
        assert_eq!(c.surface().len(), FRAME_BUFFER_LEN);
        c.relayout(Background::Console);
        assert_eq!(c.surface().len(), 788 * 428 * 4);
        assert_eq!(pixel(&c, 639, 223), FACE_BUTTON);
    }

    #[test]
    fn wrong_sized_frame_is_skipped() {
        let mut c = Compositor::new(Background::None);
        c.present(&[0xff; 16]);
        assert!(c.surface().iter().all(|&b| b == 0));
    }
}
