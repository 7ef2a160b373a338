use crate::pixel::Pixel;

pub const INDEX_LEN: usize = 64;

/// The 64-slot table of recently seen pixels, keyed by [`Pixel::hash`].
///
/// A store silently evicts whatever pixel previously held the slot, so a hit
/// is only valid after comparing the slot against the actual pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorIndex {
    slots: [Pixel; INDEX_LEN],
}

impl Default for ColorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorIndex {
    pub const fn new() -> Self {
        Self {
            slots: [Pixel::ZERO; INDEX_LEN],
        }
    }

    /// `hash` is reduced modulo 64, so any value is a valid slot.
    pub fn lookup(&self, hash: usize) -> Pixel {
        self.slots[hash % INDEX_LEN]
    }

    pub fn store(&mut self, hash: usize, pixel: Pixel) {
        self.slots[hash % INDEX_LEN] = pixel;
    }

    /// Returns the slot of `pixel` if the cache holds exactly it there.
    /// Otherwise `pixel` replaces the slot's content and `None` is returned.
    pub fn find_or_store(&mut self, pixel: Pixel) -> Option<u8> {
        let hash = pixel.hash();
        if self.lookup(hash) == pixel {
            // hash < 64
            Some(hash as u8)
        } else {
            self.store(hash, pixel);
            None
        }
    }
}
