use std::io::{self, Read, Write};

use derive_more::{Display, Error};

use crate::{
    chunk::Chunk,
    header::{DescriptorError, END_MARKER, HEADER_LEN, Header},
    index::ColorIndex,
    pixel::Pixel,
};

/// Decodes a QOI stream from `input`, writing `channels` bytes per pixel to
/// `output`.
///
/// Reading stops after the last pixel; the end marker is checked but a
/// missing one is only logged. On error, `output` may hold a prefix of the
/// image.
pub fn decode(
    input: &mut impl Read,
    output: &mut impl Write,
) -> Result<Header, DecodeError> {
    let header = decode_header(input)?;
    let n_pixels = header.n_pixels()?;
    log::debug!(
        "decoding {}x{} {} image",
        header.width,
        header.height,
        header.channels
    );
    let mut decoder = Decoder::new(header);
    while decoder.n_pixels < n_pixels {
        decoder.decode_chunk(input, output, n_pixels)?;
    }
    output.flush()?;
    if !decoder.end_marker_present(input) {
        log::warn!("QOI stream is not terminated by the expected end marker");
    }
    log::debug!("decoded {n_pixels} pixels");
    Ok(header)
}

/// Decodes a whole in-memory QOI stream. Either every pixel is returned or
/// an error is, never a partial image.
pub fn decode_to_vec(data: &[u8]) -> Result<(Vec<u8>, Header), DecodeError> {
    let header = decode_header(&mut &data[..])?;
    // A single chunk byte expands to at most 62 pixels, so don't trust the
    // header alone for the allocation.
    let bound = data
        .len()
        .saturating_mul(62)
        .saturating_mul(header.channels.count());
    let mut output = Vec::with_capacity(header.raw_len()?.min(bound));
    let header = decode(&mut &data[..], &mut output)?;
    Ok((output, header))
}

/// Reads and validates the 14-byte header.
pub fn decode_header(input: &mut impl Read) -> Result<Header, DecodeError> {
    Header::from_bytes(&input.read_array::<HEADER_LEN>()?)
}

pub(crate) trait ReadExt: Read {
    fn read_byte(&mut self) -> io::Result<u8> {
        let mut result = [0u8; 1];
        self.read_exact(&mut result)?;
        Ok(result[0])
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut result = [0u8; N];
        self.read_exact(&mut result)?;
        Ok(result)
    }
}

impl<R: Read> ReadExt for R {}

#[derive(Debug, Display, Error)]
pub enum DecodeError {
    #[display("invalid magic bytes {found:?}, expected \"qoif\"")]
    InvalidMagic { found: [u8; 4] },
    #[display("invalid header: {_0}")]
    InvalidHeader(DescriptorError),
    #[display("stream ended before the image was complete")]
    Truncated,
    #[display("{_0}")]
    IoError(io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Self::Truncated,
            _ => Self::IoError(e),
        }
    }
}

impl From<DescriptorError> for DecodeError {
    fn from(e: DescriptorError) -> Self {
        Self::InvalidHeader(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Decoder {
    pub(crate) header: Header,
    pub(crate) index: ColorIndex,
    pub(crate) previous_pixel: Pixel,
    /// Number of pixels already decoded.
    pub(crate) n_pixels: usize,
}

impl Decoder {
    pub(crate) fn new(header: Header) -> Self {
        Self {
            header,
            index: ColorIndex::new(),
            previous_pixel: Pixel::OPAQUE_BLACK,
            n_pixels: 0,
        }
    }

    fn write_pixel(&self, pixel: Pixel, output: &mut impl Write) -> io::Result<()> {
        let rgba = pixel.to_rgba();
        output.write_all(&rgba[..self.header.channels.count()])
    }

    /// Decodes one chunk, producing one pixel or a run of them. A run never
    /// extends past `n_total` pixels.
    pub(crate) fn decode_chunk(
        &mut self,
        stream: &mut impl Read,
        output: &mut impl Write,
        n_total: usize,
    ) -> Result<(), DecodeError> {
        let previous = self.previous_pixel;
        let pixel = match Chunk::read_from(stream)? {
            Chunk::Rgb([r, g, b]) => Pixel::new(r, g, b, previous.a),
            Chunk::Rgba(rgba) => Pixel::from_rgba(rgba),
            Chunk::Index(slot) => {
                // Already cached, nothing to store.
                let pixel = self.index.lookup(usize::from(slot));
                self.previous_pixel = pixel;
                self.n_pixels += 1;
                self.write_pixel(pixel, output)?;
                return Ok(());
            }
            Chunk::Diff { dr, dg, db } => previous.wrapping_offset(dr, dg, db),
            Chunk::Luma { dg, dr_dg, db_dg } => {
                previous.wrapping_offset(dr_dg + dg, dg, db_dg + dg)
            }
            Chunk::Run(run) => {
                let remaining = n_total - self.n_pixels;
                let run = usize::from(run);
                if run > remaining {
                    log::warn!(
                        "run of {run} pixels overflows the image by {}",
                        run - remaining
                    );
                }
                for _ in 0..run.min(remaining) {
                    self.write_pixel(previous, output)?;
                }
                self.n_pixels += run.min(remaining);
                return Ok(());
            }
        };
        self.index.store(pixel.hash(), pixel);
        self.previous_pixel = pixel;
        self.n_pixels += 1;
        self.write_pixel(pixel, output)?;
        Ok(())
    }

    /// Whether the next 8 bytes of `stream` are the end marker.
    pub(crate) fn end_marker_present(&self, stream: &mut impl Read) -> bool {
        matches!(stream.read_array::<8>(), Ok(marker) if marker == END_MARKER)
    }
}
