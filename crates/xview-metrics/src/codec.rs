//! Raster decoding as an explicit capability.
//!
//! Some runtimes have no raster decoder at all. Rather than letting a
//! missing decoder surface as a zero score, every extractor takes a
//! [`RasterCodec`] and reports [`ExtractError::CodecUnavailable`] when
//! the capability is absent.

use image::DynamicImage;

use crate::types::ExtractError;

/// Selects which codec implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterCodecKind {
    /// Decode with the `image` crate (PNG, JPEG, BMP, WebP).
    #[default]
    ImageCrate,
    /// No decoder available. Every decode reports
    /// [`ExtractError::CodecUnavailable`].
    Unavailable,
}

/// Trait for raster decoding capabilities.
pub trait RasterCodec: Send + Sync {
    /// Whether this codec can decode anything at all.
    fn is_available(&self) -> bool;

    /// Decode raw image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::CodecUnavailable`] when the codec is absent,
    /// [`ExtractError::EmptyInput`] for empty bytes, and
    /// [`ExtractError::ImageDecode`] for corrupt or unknown formats.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ExtractError>;
}

impl RasterCodec for RasterCodecKind {
    fn is_available(&self) -> bool {
        matches!(self, Self::ImageCrate)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ExtractError> {
        match *self {
            Self::ImageCrate => decode_with_image_crate(bytes),
            Self::Unavailable => Err(ExtractError::CodecUnavailable),
        }
    }
}

fn decode_with_image_crate(bytes: &[u8]) -> Result<DynamicImage, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::EmptyInput);
    }
    let img = image::load_from_memory(bytes)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(ExtractError::EmptyImage);
    }
    Ok(img)
}
