//! Drawing seam and the text layouts drawn through it.
//!
//! The sequencer only talks to a [`Surface`]. [`FrameBuffer`] is the
//! in-memory surface used by the panel runtime and the tests; it keeps RGB565
//! pixels plus the glyph placed at each character cell so the current screen
//! can be read back as text.

use super::palette::{BLACK, Palette, YELLOW};
use crate::format::wrap_to_width;
use std::collections::BTreeMap;

/// Horizontal advance of one glyph, in pixels.
pub const CHAR_ADVANCE: u16 = 6;
/// Vertical distance between text lines, in pixels.
pub const LINE_PITCH: u16 = 10;
/// Height of one glyph row, in pixels.
pub const GLYPH_HEIGHT: u16 = 8;

const GLYPH_INK_WIDTH: u16 = 5;
const GLYPH_INK_HEIGHT: u16 = 7;

/// Label shown while the panel is "thinking".
pub const THINKING_LABEL: &str = "thinking";

/// A pixel surface the sequencer draws on.
pub trait Surface {
    fn width(&self) -> u16;
    fn height(&self) -> u16;

    /// Fills a rectangle, clipped to the surface.
    fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, color: u16);

    /// Draws one glyph with its top-left corner at `(x, y)`.
    fn draw_char(&mut self, x: u16, y: u16, ch: char, color: u16);

    fn clear(&mut self) {
        let (w, h) = (self.width(), self.height());
        self.fill_rect(0, 0, w, h, BLACK);
    }

    /// Character columns that fit across the surface.
    fn columns(&self) -> usize {
        usize::from((self.width() / CHAR_ADVANCE).max(1))
    }
}

/// A glyph placed on a [`FrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub ch: char,
    pub color: u16,
}

/// In-memory RGB565 surface.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u16,
    height: u16,
    pixels: Vec<u16>,
    // Keyed by (y, x) so rows iterate top to bottom, left to right.
    glyphs: BTreeMap<(u16, u16), Glyph>,
}

impl FrameBuffer {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![BLACK; usize::from(width) * usize::from(height)],
            glyphs: BTreeMap::new(),
        }
    }

    /// Pixel at `(x, y)`, or `None` outside the surface.
    pub fn pixel(&self, x: u16, y: u16) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(usize::from(y) * usize::from(self.width) + usize::from(x))
            .copied()
    }

    /// `true` when every pixel is black.
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&p| p == BLACK)
    }

    /// Glyph whose top-left corner is at `(x, y)`.
    pub fn glyph_at(&self, x: u16, y: u16) -> Option<Glyph> {
        self.glyphs.get(&(y, x)).copied()
    }

    /// Text currently on screen, one string per occupied glyph row.
    pub fn text_rows(&self) -> Vec<String> {
        let mut rows: Vec<(u16, String)> = Vec::new();
        for (&(y, x), glyph) in &self.glyphs {
            if rows.last().is_none_or(|(row_y, _)| *row_y != y) {
                rows.push((y, String::new()));
            }
            if let Some((_, row)) = rows.last_mut() {
                let col = usize::from(x / CHAR_ADVANCE);
                while row.chars().count() < col {
                    row.push(' ');
                }
                row.push(glyph.ch);
            }
        }
        rows.into_iter()
            .map(|(_, row)| row.trim_end().to_owned())
            .collect()
    }

    fn set_pixel(&mut self, x: u16, y: u16, color: u16) {
        if x < self.width && y < self.height {
            let idx = usize::from(y) * usize::from(self.width) + usize::from(x);
            if let Some(p) = self.pixels.get_mut(idx) {
                *p = color;
            }
        }
    }
}

impl Surface for FrameBuffer {
    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, color: u16) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for py in y..y_end {
            for px in x..x_end {
                self.set_pixel(px, py, color);
            }
        }
        self.glyphs
            .retain(|&(gy, gx), _| !(gx >= x && gx < x_end && gy >= y && gy < y_end));
    }

    fn draw_char(&mut self, x: u16, y: u16, ch: char, color: u16) {
        if x >= self.width || y >= self.height {
            return;
        }
        // Glyph ink is a solid cell; font rasterisation lives in the firmware.
        if !ch.is_whitespace() {
            for dy in 0..GLYPH_INK_HEIGHT {
                for dx in 0..GLYPH_INK_WIDTH {
                    self.set_pixel(x.saturating_add(dx), y.saturating_add(dy), color);
                }
            }
        }
        self.glyphs.insert((y, x), Glyph { ch, color });
    }
}

/// Splits `text` on newlines and wraps each line to `cols` characters.
/// Blank source lines keep their row.
pub fn layout_lines(text: &str, cols: usize) -> Vec<String> {
    text.trim_end_matches(['\n', '\r'])
        .split('\n')
        .flat_map(|line| {
            let wrapped = wrap_to_width(line.trim_end_matches('\r'), cols);
            if wrapped.is_empty() {
                vec![String::new()]
            } else {
                wrapped
            }
        })
        .collect()
}

/// Total characters a full reveal of `lines` draws.
pub fn visible_chars(lines: &[String]) -> usize {
    lines.iter().map(|l| l.chars().count()).sum()
}

/// Clears the surface and draws `lines`, each in its palette colour.
///
/// `reveal` limits how many characters are drawn in total; `None` draws
/// everything.
pub fn draw_wrapped_gradient<S: Surface + ?Sized>(
    surface: &mut S,
    lines: &[String],
    palette: &Palette,
    reveal: Option<usize>,
) {
    surface.clear();
    let mut budget = reveal.unwrap_or(usize::MAX);
    let mut y: u16 = 0;

    for (index, line) in lines.iter().enumerate() {
        let color = palette.line_color(index);
        let mut x: u16 = 0;
        for ch in line.chars() {
            if budget == 0 {
                return;
            }
            surface.draw_char(x, y, ch, color);
            x = x.saturating_add(CHAR_ADVANCE);
            budget -= 1;
        }
        y = y.saturating_add(LINE_PITCH);
    }
}

/// Redraws the bottom strip with the thinking label and, when `cursor_on`,
/// a trailing underscore.
pub fn render_thinking<S: Surface + ?Sized>(surface: &mut S, cursor_on: bool) {
    let y = surface.height().saturating_sub(GLYPH_HEIGHT);
    let width = surface.width();
    surface.fill_rect(0, y, width, GLYPH_HEIGHT, BLACK);

    let mut x: u16 = 0;
    for ch in THINKING_LABEL.chars() {
        surface.draw_char(x, y, ch, YELLOW);
        x = x.saturating_add(CHAR_ADVANCE);
    }
    if cursor_on {
        surface.draw_char(x, y, '_', YELLOW);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn columns_follow_width() {
        assert_eq!(FrameBuffer::new(128, 64).columns(), 21);
        assert_eq!(FrameBuffer::new(4, 8).columns(), 1);
    }

    #[test]
    fn layout_wraps_each_source_line() {
        let laid = layout_lines("Time hums like a fan in a small room\nok\n", 21);
        assert_eq!(laid, lines(&["Time hums like a fan", "in a small room", "ok"]));
    }

    #[test]
    fn layout_keeps_blank_rows_and_strips_cr() {
        assert_eq!(layout_lines("a\r\n\r\nb", 21), lines(&["a", "", "b"]));
    }

    #[test]
    fn gradient_draws_lines_at_pitch_with_line_colours() {
        let palette = Palette::from_base([40, 255, 40]);
        let mut fb = FrameBuffer::new(128, 64);
        draw_wrapped_gradient(&mut fb, &lines(&["ab", "cd"]), &palette, None);

        assert_eq!(fb.text_rows(), vec!["ab", "cd"]);
        assert_eq!(fb.glyph_at(6, 0).unwrap().ch, 'b');
        assert_eq!(fb.glyph_at(0, 10).unwrap().color, palette.line_color(1));
        assert_eq!(fb.pixel(0, 0), Some(0xFFFF));
    }

    #[test]
    fn reveal_limits_total_characters() {
        let mut fb = FrameBuffer::new(128, 64);
        let text = lines(&["abc", "def"]);
        draw_wrapped_gradient(&mut fb, &text, &Palette::default(), Some(4));
        assert_eq!(fb.text_rows(), vec!["abc", "d"]);

        draw_wrapped_gradient(&mut fb, &text, &Palette::default(), Some(0));
        assert!(fb.is_blank());
        assert!(fb.text_rows().is_empty());
    }

    #[test]
    fn thinking_strip_blinks_cursor() {
        let mut fb = FrameBuffer::new(128, 64);
        render_thinking(&mut fb, true);
        assert_eq!(fb.text_rows(), vec!["thinking_"]);
        assert_eq!(fb.glyph_at(0, 56).unwrap().color, YELLOW);

        render_thinking(&mut fb, false);
        assert_eq!(fb.text_rows(), vec!["thinking"]);
    }

    #[test]
    fn fill_rect_clears_glyphs_inside() {
        let mut fb = FrameBuffer::new(128, 64);
        draw_wrapped_gradient(&mut fb, &lines(&["xy"]), &Palette::default(), None);
        fb.fill_rect(0, 0, 4, 4, BLACK);
        assert_eq!(fb.text_rows(), vec![" y"]);
    }
}
