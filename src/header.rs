use derive_more::{Display, Error};

use crate::decode::DecodeError;

/// Length of the fixed header in front of every QOI stream.
pub const HEADER_LEN: usize = 14;

/// The 8 bytes terminating every QOI stream.
pub const END_MARKER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

pub const MAGIC: [u8; 4] = *b"qoif";

/// The image descriptor carried in the header of a QOI stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
    pub colorspace: Colorspace,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Channels {
    #[default]
    #[display("RGB")]
    Rgb = 3,
    #[display("RGBA")]
    Rgba = 4,
}

impl Channels {
    /// Number of bytes one pixel occupies in a raw buffer.
    pub const fn count(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Channels {
    type Error = DescriptorError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            3 => Ok(Self::Rgb),
            4 => Ok(Self::Rgba),
            channels => Err(DescriptorError::InvalidChannels { channels }),
        }
    }
}

/// Opaque to the codec, carried through unchanged.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Colorspace {
    /// sRGB with linear alpha.
    #[default]
    #[display("sRGB")]
    Srgb = 0,
    /// All channels linear.
    #[display("linear")]
    Linear = 1,
}

impl TryFrom<u8> for Colorspace {
    type Error = DescriptorError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Srgb),
            1 => Ok(Self::Linear),
            colorspace => Err(DescriptorError::InvalidColorspace { colorspace }),
        }
    }
}

/// Reasons an image descriptor is refused. Raised before any pixel is
/// touched, so the caller can correct the input and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum DescriptorError {
    #[display("image width must be at least 1")]
    ZeroWidth,
    #[display("image height must be at least 1")]
    ZeroHeight,
    #[display("invalid number of channels {channels}, expected 3 or 4")]
    InvalidChannels { channels: u8 },
    #[display("invalid colorspace {colorspace}, expected 0 (sRGB) or 1 (linear)")]
    InvalidColorspace { colorspace: u8 },
    #[display("a {width}x{height} image does not fit in addressable memory")]
    TooLarge { width: u32, height: u32 },
}

impl Header {
    /// Builds a header from raw descriptor fields, validating all four.
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        colorspace: u8,
    ) -> Result<Self, DescriptorError> {
        let header = Self {
            width,
            height,
            channels: Channels::try_from(channels)?,
            colorspace: Colorspace::try_from(colorspace)?,
        };
        header.validate()?;
        Ok(header)
    }

    /// Checks the parts of the descriptor the type system can't: both
    /// dimensions non-zero and the worst-case stream size addressable.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.width == 0 {
            return Err(DescriptorError::ZeroWidth);
        }
        if self.height == 0 {
            return Err(DescriptorError::ZeroHeight);
        }
        self.max_encoded_len().map(drop)
    }

    pub fn n_pixels(&self) -> Result<usize, DescriptorError> {
        usize::try_from(u64::from(self.width) * u64::from(self.height))
            .map_err(|_| self.too_large())
    }

    /// Length of the raw pixel buffer this header describes.
    pub fn raw_len(&self) -> Result<usize, DescriptorError> {
        self.n_pixels()?
            .checked_mul(self.channels.count())
            .ok_or_else(|| self.too_large())
    }

    /// Upper bound on the encoded stream: every pixel as an RGBA chunk, plus
    /// header and end marker.
    pub fn max_encoded_len(&self) -> Result<usize, DescriptorError> {
        self.n_pixels()?
            .checked_mul(self.channels.count() + 1)
            .and_then(|len| len.checked_add(HEADER_LEN + END_MARKER.len()))
            .ok_or_else(|| self.too_large())
    }

    fn too_large(&self) -> DescriptorError {
        DescriptorError::TooLarge {
            width: self.width,
            height: self.height,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..8].copy_from_slice(&self.width.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.height.to_be_bytes());
        bytes[12] = self.channels as u8;
        bytes[13] = self.colorspace as u8;
        bytes
    }

    /// Parses and validates the 14 header bytes.
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Result<Self, DecodeError> {
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(DecodeError::InvalidMagic { found: magic });
        }
        let header = Self {
            width: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            height: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            channels: Channels::try_from(bytes[12])?,
            colorspace: Colorspace::try_from(bytes[13])?,
        };
        header.validate()?;
        Ok(header)
    }
}
