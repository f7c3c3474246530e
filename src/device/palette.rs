//! Per-line colour gradient.
//!
//! Line 0 is white, line [`GRADIENT_STEPS`] is the base colour, and the lines
//! in between are linear blends. Colours are packed as RGB565 for the panel.

use rand::Rng;

/// Number of blend steps between white and the base colour.
pub const GRADIENT_STEPS: usize = 5;

/// Black in RGB565.
pub const BLACK: u16 = 0;

/// Yellow in RGB565, used by the thinking indicator.
pub const YELLOW: u16 = color565(255, 255, 0);

/// Packs 8-bit channels into RGB565.
pub const fn color565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Rounded linear blend of `a` toward `b` by `t / 255`.
pub fn lerp8(a: u8, b: u8, t: u8) -> u8 {
    let (a, b, t) = (u32::from(a), u32::from(b), u32::from(t));
    ((a * (255 - t) + b * t + 127) / 255) as u8
}

/// Six RGB565 colours, one per visual line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    base: [u8; 3],
    colors: [u16; GRADIENT_STEPS + 1],
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_base([255, 255, 255])
    }
}

impl Palette {
    /// Builds the gradient from white to `base`.
    pub fn from_base(base: [u8; 3]) -> Self {
        let mut colors = [0u16; GRADIENT_STEPS + 1];
        for (i, color) in colors.iter_mut().enumerate() {
            let t = (i * (255 / GRADIENT_STEPS)) as u8;
            *color = color565(
                lerp8(255, base[0], t),
                lerp8(255, base[1], t),
                lerp8(255, base[2], t),
            );
        }
        Self { base, colors }
    }

    /// Random base colour: one channel saturated, the other two in 40..=220.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut base = [0u8; 3];
        for channel in &mut base {
            *channel = rng.gen_range(40..=220);
        }
        base[rng.gen_range(0..3)] = 255;
        Self::from_base(base)
    }

    pub fn base(&self) -> [u8; 3] {
        self.base
    }

    /// Colour for visual line `index`; lines past the last step reuse the
    /// base colour.
    pub fn line_color(&self, index: usize) -> u16 {
        self.colors[index.min(GRADIENT_STEPS)]
    }
}
