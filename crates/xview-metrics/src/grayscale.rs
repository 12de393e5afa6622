//! Image decoding and grayscale conversion.
//!
//! Every metric starts here: raw bytes in, a decoded image (and its
//! luminance channel) out. Decoding goes through a [`RasterCodec`] so
//! an absent decoder is reported distinctly from a corrupt image.

use image::{DynamicImage, GrayImage};

use crate::codec::RasterCodec;
use crate::types::{Dimensions, ExtractError};

/// Decode raw image bytes and convert to grayscale.
///
/// The standard luminance formula is used for RGB-to-gray conversion:
/// `0.299*R + 0.587*G + 0.114*B`. The source dimensions are returned
/// alongside so callers can keep the true aspect ratio after resizing.
///
/// # Errors
///
/// Propagates the codec's [`ExtractError`].
pub fn decode_and_grayscale(
    codec: &dyn RasterCodec,
    bytes: &[u8],
) -> Result<(GrayImage, Dimensions), ExtractError> {
    let img = codec.decode(bytes)?;
    let dimensions = dimensions_of(&img);
    Ok((img.to_luma8(), dimensions))
}

/// Pixel dimensions of a decoded image.
#[must_use]
pub fn dimensions_of(img: &DynamicImage) -> Dimensions {
    Dimensions {
        width: img.width(),
        height: img.height(),
    }
}
