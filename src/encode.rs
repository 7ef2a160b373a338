use std::io::{self, Write};

use derive_more::{Display, Error, From};

use crate::{
    chunk::{Chunk, MAX_RUN},
    header::{Channels, DescriptorError, END_MARKER, Header},
    index::ColorIndex,
    pixel::{Pixel, wrap_diff},
};

#[derive(Debug, Display, Error, From)]
pub enum EncodeError {
    #[display("invalid image descriptor: {_0}")]
    #[from]
    InvalidDescriptor(DescriptorError),
    #[display("pixel buffer holds {actual} bytes, expected {expected}")]
    PixelBufferLength { expected: usize, actual: usize },
    #[display("pixel source yielded {actual} pixels, expected {expected}")]
    PixelCount { expected: usize, actual: usize },
    #[display("pixel source yielded more than the expected {expected} pixels")]
    TooManyPixels { expected: usize },
    #[display("output buffer holds {actual} bytes, at least {required} are required")]
    OutputTooSmall { required: usize, actual: usize },
    #[display("{_0}")]
    #[from]
    IoError(io::Error),
}

/// Encodes exactly `width * height` pixels from `pixels` into `output`.
///
/// The header is validated before anything is written. If `pixels` runs dry
/// early, the bytes already written to `output` are an incomplete stream.
pub fn encode(
    header: Header,
    pixels: impl IntoIterator<Item = Pixel>,
    output: &mut impl Write,
) -> Result<usize, EncodeError> {
    header.validate()?;
    let n_pixels = header.n_pixels()?;
    log::debug!(
        "encoding {}x{} {} image",
        header.width,
        header.height,
        header.channels
    );

    let mut pixels = pixels.into_iter();
    let mut encoder = EncoderState::new(header, output);
    encoder.encode_header()?;
    for encoded in 0..n_pixels {
        let pixel = pixels.next().ok_or(EncodeError::PixelCount {
            expected: n_pixels,
            actual: encoded,
        })?;
        encoder.encode_pixel(pixel)?;
    }
    // Only one pixel past the end is pulled, the source may be endless.
    if pixels.next().is_some() {
        return Err(EncodeError::TooManyPixels { expected: n_pixels });
    }
    let written = encoder.finish()?;
    log::debug!("encoded {n_pixels} pixels into {written} bytes");
    Ok(written)
}

/// Encodes an interleaved RGB or RGBA buffer into a freshly allocated QOI
/// stream. Nothing is allocated if the descriptor or buffer is invalid.
pub fn encode_to_vec(header: Header, data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    check_pixel_buffer(&header, data)?;
    let mut output = Vec::with_capacity(header.max_encoded_len()?);
    encode(header, raw_pixels(header.channels, data), &mut output)?;
    output.shrink_to_fit();
    Ok(output)
}

/// Encodes into a caller-provided buffer, returning the number of bytes used.
///
/// `output` must hold at least [`Header::max_encoded_len`] bytes; this is
/// checked before anything is written.
pub fn encode_into(
    header: Header,
    data: &[u8],
    output: &mut [u8],
) -> Result<usize, EncodeError> {
    check_pixel_buffer(&header, data)?;
    let required = header.max_encoded_len()?;
    if output.len() < required {
        return Err(EncodeError::OutputTooSmall {
            required,
            actual: output.len(),
        });
    }
    let mut rest = &mut output[..];
    match encode(header, raw_pixels(header.channels, data), &mut rest) {
        Err(EncodeError::IoError(e)) if e.kind() == io::ErrorKind::WriteZero => {
            unreachable!("QOI stream outgrew its worst-case size of {required} bytes")
        }
        result => result,
    }
}

fn check_pixel_buffer(header: &Header, data: &[u8]) -> Result<(), EncodeError> {
    header.validate()?;
    let expected = header.raw_len()?;
    if data.len() != expected {
        return Err(EncodeError::PixelBufferLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Splits an interleaved buffer into pixels. RGB pixels get an alpha of 255.
pub fn raw_pixels(channels: Channels, data: &[u8]) -> impl Iterator<Item = Pixel> + '_ {
    data.chunks_exact(channels.count())
        .map(move |px| match channels {
            Channels::Rgb => Pixel::from_rgb([px[0], px[1], px[2]]),
            Channels::Rgba => Pixel::from_rgba([px[0], px[1], px[2], px[3]]),
        })
}

#[derive(Debug)]
pub(crate) struct EncoderState<W: Write> {
    pub(crate) header: Header,
    pub(crate) index: ColorIndex,
    pub(crate) previous_pixel: Pixel,
    /// Pending repeats of `previous_pixel`, `0..MAX_RUN`.
    pub(crate) run: u8,
    pub(crate) output: W,
    pub(crate) written: usize,
}

impl<W: Write> EncoderState<W> {
    pub(crate) fn new(header: Header, output: W) -> Self {
        Self {
            header,
            index: ColorIndex::new(),
            previous_pixel: Pixel::OPAQUE_BLACK,
            run: 0,
            output,
            written: 0,
        }
    }

    pub(crate) fn encode_header(&mut self) -> io::Result<()> {
        let header = self.header.to_bytes();
        self.output.write_all(&header)?;
        self.written += header.len();
        Ok(())
    }

    fn emit(&mut self, chunk: Chunk) -> io::Result<()> {
        chunk.write_to(&mut self.output)?;
        self.written += chunk.encoded_len();
        Ok(())
    }

    fn flush_run(&mut self) -> io::Result<()> {
        if self.run > 0 {
            log::trace!("run of {} x {:?}", self.run, self.previous_pixel);
            self.emit(Chunk::Run(self.run))?;
            self.run = 0;
        }
        Ok(())
    }

    pub(crate) fn encode_pixel(&mut self, pixel: Pixel) -> io::Result<()> {
        if pixel == self.previous_pixel {
            self.run += 1;
            if self.run == MAX_RUN {
                self.flush_run()?;
            }
            return Ok(());
        }
        self.flush_run()?;
        let chunk = self.choose_chunk(pixel);
        self.previous_pixel = pixel;
        self.emit(chunk)
    }

    /// Picks the chunk for a pixel that differs from the previous one. A miss
    /// in the color index stores the pixel there.
    pub(crate) fn choose_chunk(&mut self, pixel: Pixel) -> Chunk {
        if let Some(slot) = self.index.find_or_store(pixel) {
            return Chunk::Index(slot);
        }
        let previous = self.previous_pixel;
        if pixel.a != previous.a {
            return Chunk::Rgba(pixel.to_rgba());
        }
        let dr = wrap_diff(pixel.r, previous.r);
        let dg = wrap_diff(pixel.g, previous.g);
        let db = wrap_diff(pixel.b, previous.b);
        Chunk::from_deltas(dr, dg, db).unwrap_or(Chunk::Rgb([pixel.r, pixel.g, pixel.b]))
    }

    /// Flushes a dangling run and writes the end marker. Returns the total
    /// number of bytes written.
    pub(crate) fn finish(mut self) -> io::Result<usize> {
        self.flush_run()?;
        self.output.write_all(&END_MARKER)?;
        self.written += END_MARKER.len();
        self.output.flush()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use std::iter;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::header::{Colorspace, HEADER_LEN};

    fn state() -> EncoderState<Vec<u8>> {
        EncoderState::new(
            Header {
                width: 16,
                height: 16,
                channels: Channels::Rgba,
                colorspace: Colorspace::Srgb,
            },
            Vec::new(),
        )
    }

    #[test]
    fn encoding_rgb_op() {
        let mut state = state();
        state.encode_pixel(Pixel::new(101, 102, 103, 255)).unwrap();
        assert_eq!(state.output, [0xfe, 101, 102, 103]);
    }

    #[test]
    fn encoding_rgba_op() {
        let mut state = state();
        state.encode_pixel(Pixel::new(101, 102, 103, 104)).unwrap();
        assert_eq!(state.output, [0xff, 101, 102, 103, 104]);
    }

    #[test]
    fn alpha_change_forces_rgba() {
        let mut state = state();
        state.previous_pixel = Pixel::new(100, 100, 100, 255);
        state.encode_pixel(Pixel::new(100, 100, 101, 254)).unwrap();
        assert_eq!(state.output, [0xff, 100, 100, 101, 254]);
    }

    #[test]
    fn encoding_run_op() {
        let mut state = state();
        let pixel = Pixel::new(101, 102, 103, 104);
        state.previous_pixel = pixel;
        state.encode_pixel(pixel).unwrap();
        assert_eq!(state.output.len(), 0);
        assert_eq!(state.run, 1);

        state.encode_pixel(Pixel { a: 0, ..pixel }).unwrap();
        assert_eq!(state.output[0], 0xc0);
        assert_eq!(state.run, 0);
    }

    #[test]
    fn encoding_max_run_op() {
        let mut state = state();
        let pixel = Pixel::new(101, 102, 103, 104);
        state.previous_pixel = pixel;
        state.run = 61;
        state.encode_pixel(pixel).unwrap();
        assert_eq!(state.output, [0xc0 | 61]);
        assert_eq!(state.run, 0);

        state.encode_pixel(pixel).unwrap();
        assert_eq!(state.output.len(), 1);
        assert_eq!(state.run, 1);
    }

    #[test]
    fn dangling_run_is_flushed_by_finish() {
        let mut output = Vec::new();
        let mut state = EncoderState::new(state().header, &mut output);
        state.encode_pixel(Pixel::OPAQUE_BLACK).unwrap();
        state.encode_pixel(Pixel::OPAQUE_BLACK).unwrap();
        assert_eq!(state.finish().unwrap(), 1 + END_MARKER.len());
        assert_eq!(output, [0xc1, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn encoding_index_op() {
        let mut state = state();
        let pixel = Pixel::new(101, 102, 103, 104);
        state.index.store(pixel.hash(), pixel);
        state.encode_pixel(pixel).unwrap();
        assert_eq!(state.output, [54]);
    }

    #[test]
    fn index_miss_stores_pixel() {
        let mut state = state();
        let pixel = Pixel::new(101, 102, 103, 104);
        assert_eq!(state.choose_chunk(pixel), Chunk::Rgba([101, 102, 103, 104]));
        assert_eq!(state.index.lookup(54), pixel);
    }

    #[test]
    fn stale_slot_is_not_an_index_hit() {
        let mut state = state();
        // Same slot, different colors.
        let a = Pixel::new(10, 0, 0, 255);
        let b = Pixel::new(74, 0, 0, 255);
        assert_eq!(a.hash(), b.hash());
        state.index.store(b.hash(), b);
        state.previous_pixel = Pixel::new(9, 0, 0, 255);
        assert_eq!(state.choose_chunk(a), Chunk::Diff { dr: 1, dg: 0, db: 0 });
        assert_eq!(state.index.lookup(a.hash()), a);
    }

    #[test]
    fn encoding_diff_op() {
        let mut state = state();
        state.previous_pixel = Pixel::new(100, 100, 100, 255);
        state.encode_pixel(Pixel::new(101, 101, 101, 255)).unwrap();
        assert_eq!(state.output, [0x40 | 3 << 4 | 3 << 2 | 3]);

        state.encode_pixel(Pixel::new(99, 99, 99, 255)).unwrap();
        assert_eq!(state.output[1], 0x40);
    }

    #[test]
    fn diff_wraps_around() {
        let mut state = state();
        state.previous_pixel = Pixel::new(255, 0, 1, 255);
        assert_eq!(
            state.choose_chunk(Pixel::new(0, 254, 255, 255)),
            Chunk::Diff { dr: 1, dg: -2, db: -2 }
        );
    }

    #[test]
    fn encoding_luma_op() {
        let mut state = state();
        state.previous_pixel = Pixel::new(100, 100, 100, 255);
        state.encode_pixel(Pixel::new(100, 108, 100, 255)).unwrap();
        assert_eq!(state.output, [0x80 | 40, 0]);

        state.encode_pixel(Pixel::new(99, 100, 99, 255)).unwrap();
        assert_eq!(state.output[2..], [0x80 | 24, 15 << 4 | 15]);
    }

    #[test]
    fn encode_into_checks_output_size_first() {
        let header = Header::new(2, 1, 3, 0).unwrap();
        let mut output = [0xaau8; 29];
        assert!(matches!(
            encode_into(header, &[10, 20, 30, 10, 20, 30], &mut output),
            Err(EncodeError::OutputTooSmall { required: 30, actual: 29 })
        ));
        assert_eq!(output, [0xaa; 29]);
    }

    #[test]
    fn encode_into_reports_written_len() {
        let header = Header::new(2, 1, 3, 0).unwrap();
        let mut output = [0u8; 30];
        let data = [10, 20, 30, 10, 20, 30];
        let written = encode_into(header, &data, &mut output).unwrap();
        assert_eq!(written, HEADER_LEN + 4 + 1 + END_MARKER.len());
        assert_eq!(
            output[HEADER_LEN..written],
            [0xfe, 10, 20, 30, 0xc0, 0, 0, 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(encode_to_vec(header, &data).unwrap(), output[..written]);
    }

    #[test]
    fn first_pixel_can_be_luma() {
        let header = Header::new(1, 1, 3, 0).unwrap();
        let encoded = encode_to_vec(header, &[1, 2, 3]).unwrap();
        // dg = 2, dr - dg = -1, db - dg = 1
        assert_eq!(encoded[HEADER_LEN..HEADER_LEN + 2], [0x80 | 34, 7 << 4 | 9]);
    }

    #[test]
    fn short_pixel_source_is_an_error() {
        let header = Header::new(2, 2, 4, 0).unwrap();
        let mut output = Vec::new();
        assert!(matches!(
            encode(header, [Pixel::OPAQUE_BLACK; 3], &mut output),
            Err(EncodeError::PixelCount { expected: 4, actual: 3 })
        ));
        assert!(matches!(
            encode(header, [Pixel::OPAQUE_BLACK; 6], &mut Vec::new()),
            Err(EncodeError::TooManyPixels { expected: 4 })
        ));
    }

    #[test]
    fn endless_pixel_source_is_an_error() {
        let header = Header::new(2, 2, 4, 0).unwrap();
        assert!(matches!(
            encode(header, iter::repeat(Pixel::OPAQUE_BLACK), &mut Vec::new()),
            Err(EncodeError::TooManyPixels { expected: 4 })
        ));

        let mut pulled = 0;
        let pixels = iter::from_fn(|| {
            pulled += 1;
            Some(Pixel::new(1, 2, 3, 4))
        });
        assert!(matches!(
            encode(header, pixels, &mut Vec::new()),
            Err(EncodeError::TooManyPixels { expected: 4 })
        ));
        assert_eq!(pulled, 5);
    }
}
