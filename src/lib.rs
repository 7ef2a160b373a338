//! Encoder and decoder for the [QOI image format](https://qoiformat.org).
//!
//! ```
//! use qoi::{Header, decode_to_vec, encode_to_vec};
//!
//! let header = Header::new(2, 1, 3, 0)?;
//! let pixels = [211, 34, 205, 237, 135, 177];
//! let encoded = encode_to_vec(header, &pixels)?;
//! let (decoded, decoded_header) = decode_to_vec(&encoded)?;
//! assert_eq!(decoded, pixels);
//! assert_eq!(decoded_header, header);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Every call owns its color index and previous-pixel state, so separate
//! images can be encoded or decoded on separate threads.

mod chunk;
mod decode;
mod encode;
mod header;
mod index;
mod pixel;

pub use chunk::{Chunk, MAX_RUN};
pub use decode::*;
pub use encode::*;
pub use header::{
    Channels, Colorspace, DescriptorError, END_MARKER, HEADER_LEN, Header, MAGIC,
};
pub use index::{ColorIndex, INDEX_LEN};
pub use pixel::{Pixel, wrap_diff};
