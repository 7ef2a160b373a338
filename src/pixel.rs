/// A single RGBA pixel.
///
/// RGB images are modelled with `a = 255`, so the alpha channel never changes
/// between pixels of a three-channel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    /// The pixel every encode and decode starts from.
    pub const OPAQUE_BLACK: Self = Self::new(0, 0, 0, 255);

    /// Initial value of every color index slot.
    pub const ZERO: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn from_rgb([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn from_rgba([r, g, b, a]: [u8; 4]) -> Self {
        Self::new(r, g, b, a)
    }

    pub const fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// The hashing function used by QOI, already reduced to a slot in `0..64`.
    pub fn hash(self) -> usize {
        let [r, g, b, a] = self.to_rgba().map(usize::from);
        (r * 3 + g * 5 + b * 7 + a * 11) % 64
    }

    /// Applies signed per-channel deltas with 8-bit wraparound. Alpha is kept.
    pub fn wrapping_offset(self, dr: i8, dg: i8, db: i8) -> Self {
        Self {
            r: self.r.wrapping_add_signed(dr),
            g: self.g.wrapping_add_signed(dg),
            b: self.b.wrapping_add_signed(db),
            a: self.a,
        }
    }
}

impl Default for Pixel {
    fn default() -> Self {
        Self::OPAQUE_BLACK
    }
}

impl From<[u8; 4]> for Pixel {
    fn from(rgba: [u8; 4]) -> Self {
        Self::from_rgba(rgba)
    }
}

impl From<[u8; 3]> for Pixel {
    fn from(rgb: [u8; 3]) -> Self {
        Self::from_rgb(rgb)
    }
}

impl From<Pixel> for [u8; 4] {
    fn from(pixel: Pixel) -> Self {
        pixel.to_rgba()
    }
}

/// Signed difference `current - previous` taken modulo 256 and read back as
/// a two's-complement byte, so `previous.wrapping_add_signed(d) == current`.
#[inline(always)]
pub fn wrap_diff(current: u8, previous: u8) -> i8 {
    current.wrapping_sub(previous) as i8
}
