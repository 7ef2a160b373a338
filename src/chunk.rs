use std::io::{self, Read, Write};

use crate::{decode::ReadExt, index::INDEX_LEN};

pub const QOI_OP_INDEX: u8 = 0b00000000;
pub const QOI_OP_DIFF: u8 = 0b01000000;
pub const QOI_OP_LUMA: u8 = 0b10000000;
pub const QOI_OP_RUN: u8 = 0b11000000;
pub const QOI_OP_RGB: u8 = 0b11111110;
pub const QOI_OP_RGBA: u8 = 0b11111111;

pub const MAX_RUN: u8 = 62;

fn msb2(x: u8) -> u8 {
    x & 0b11000000
}

fn lsb6(x: u8) -> u8 {
    x & 0b00111111
}

/// One tagged unit of a QOI chunk stream.
///
/// Deltas are stored unbiased; the wire biases are applied when packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// Tag `11111110`, followed by r, g, b. Alpha is carried over.
    Rgb([u8; 3]),
    /// Tag `11111111`, followed by r, g, b, a.
    Rgba([u8; 4]),
    /// `00xxxxxx`: slot `0..64` of the color index.
    Index(u8),
    /// `01rrggbb`: each delta in `-2..=1`, biased by 2.
    Diff { dr: i8, dg: i8, db: i8 },
    /// `10gggggg rrrrbbbb`: `dg` in `-32..=31` biased by 32, `dr - dg` and
    /// `db - dg` in `-8..=7` biased by 8.
    Luma { dg: i8, dr_dg: i8, db_dg: i8 },
    /// `11xxxxxx`: repeat the previous pixel `1..=62` times, biased by -1.
    Run(u8),
}

impl Chunk {
    /// Picks `Diff` or `Luma` for a set of wraparound deltas, if either fits.
    pub fn from_deltas(dr: i8, dg: i8, db: i8) -> Option<Self> {
        let small = -2..=1;
        if small.contains(&dr) && small.contains(&dg) && small.contains(&db) {
            return Some(Self::Diff { dr, dg, db });
        }
        // Widen so `dr - dg` can't overflow i8.
        let dr_dg = i16::from(dr) - i16::from(dg);
        let db_dg = i16::from(db) - i16::from(dg);
        let luma = -8..=7;
        if (-32..=31).contains(&dg) && luma.contains(&dr_dg) && luma.contains(&db_dg) {
            return Some(Self::Luma {
                dg,
                dr_dg: dr_dg as i8,
                db_dg: db_dg as i8,
            });
        }
        None
    }

    /// Number of bytes the chunk occupies on the wire.
    pub fn encoded_len(self) -> usize {
        match self {
            Self::Index(_) | Self::Diff { .. } | Self::Run(_) => 1,
            Self::Luma { .. } => 2,
            Self::Rgb(_) => 4,
            Self::Rgba(_) => 5,
        }
    }

    /// Whether every field lies in the range its bit field can hold.
    pub fn is_packable(self) -> bool {
        let diff = -2..=1;
        let luma = -8..=7;
        match self {
            Self::Rgb(_) | Self::Rgba(_) => true,
            Self::Index(index) => usize::from(index) < INDEX_LEN,
            Self::Diff { dr, dg, db } => [dr, dg, db].iter().all(|d| diff.contains(d)),
            Self::Luma { dg, dr_dg, db_dg } => {
                (-32..=31).contains(&dg) && luma.contains(&dr_dg) && luma.contains(&db_dg)
            }
            Self::Run(run) => (1..=MAX_RUN).contains(&run),
        }
    }

    /// Packs the chunk. Fields outside their wire range are refused with
    /// [`io::ErrorKind::InvalidInput`] and nothing is written.
    pub fn write_to(self, output: &mut impl Write) -> io::Result<()> {
        if !self.is_packable() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{self:?} does not fit its QOI bit fields"),
            ));
        }
        match self {
            Self::Rgb([r, g, b]) => output.write_all(&[QOI_OP_RGB, r, g, b]),
            Self::Rgba([r, g, b, a]) => output.write_all(&[QOI_OP_RGBA, r, g, b, a]),
            Self::Index(index) => output.write_all(&[QOI_OP_INDEX | index]),
            Self::Diff { dr, dg, db } => {
                let [dr, dg, db] = [dr, dg, db].map(|d| (d + 2) as u8);
                output.write_all(&[QOI_OP_DIFF | dr << 4 | dg << 2 | db])
            }
            Self::Luma { dg, dr_dg, db_dg } => {
                let dg = (dg + 32) as u8;
                let [dr_dg, db_dg] = [dr_dg, db_dg].map(|d| (d + 8) as u8);
                output.write_all(&[QOI_OP_LUMA | dg, dr_dg << 4 | db_dg])
            }
            Self::Run(run) => output.write_all(&[QOI_OP_RUN | (run - 1)]),
        }
    }

    /// Reads the next chunk. The two full-byte tags take precedence over the
    /// 2-bit `11` run tag.
    pub fn read_from(stream: &mut impl Read) -> io::Result<Self> {
        let chunk = match stream.read_byte()? {
            QOI_OP_RGB => Self::Rgb(stream.read_array()?),
            QOI_OP_RGBA => Self::Rgba(stream.read_array()?),
            byte0 => match msb2(byte0) {
                QOI_OP_INDEX => Self::Index(lsb6(byte0)),
                QOI_OP_DIFF => Self::Diff {
                    dr: ((byte0 >> 4) & 0b11) as i8 - 2,
                    dg: ((byte0 >> 2) & 0b11) as i8 - 2,
                    db: (byte0 & 0b11) as i8 - 2,
                },
                QOI_OP_LUMA => {
                    let byte1 = stream.read_byte()?;
                    Self::Luma {
                        dg: lsb6(byte0) as i8 - 32,
                        dr_dg: (byte1 >> 4) as i8 - 8,
                        db_dg: (byte1 & 0x0f) as i8 - 8,
                    }
                }
                // Only `11` is left; 62 and 63 are taken by RGB and RGBA.
                _ => Self::Run(lsb6(byte0) + 1),
            },
        };
        Ok(chunk)
    }
}
