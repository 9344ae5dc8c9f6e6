//! Frame decoding
//!
//! Turns uploaded bytes or base64 payloads into an in-memory RGB bitmap and
//! re-encodes frames as JPEG for the vision model and for evidentiary capture.

use base64::Engine;
use image::{ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

use crate::constants::JPEG_DATA_URL_PREFIX;

/// Upper bound on decoded pixels, guards against decompression bombs
const MAX_PIXELS: u64 = 100_000_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidImageError {
    #[error("payload is empty")]
    Empty,
    #[error("payload is not valid base64")]
    Base64,
    #[error("unrecognized or corrupt image data: {0}")]
    Decode(String),
    #[error("image has invalid dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },
}

/// One decoded camera image (width x height x 3, 8-bit)
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: RgbImage,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Encode as baseline JPEG
    pub fn to_jpeg(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut output = Cursor::new(Vec::new());
        self.pixels.write_to(&mut output, ImageFormat::Jpeg)?;
        Ok(output.into_inner())
    }
}

/// Wrap already-encoded JPEG bytes as a data URL
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!(
        "{}{}",
        JPEG_DATA_URL_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(jpeg)
    )
}

impl From<RgbImage> for Frame {
    fn from(pixels: RgbImage) -> Self {
        Self { pixels }
    }
}

/// Decode raw bytes from a file upload
pub fn decode_frame(data: &[u8]) -> Result<Frame, InvalidImageError> {
    if data.is_empty() {
        return Err(InvalidImageError::Empty);
    }

    let reader = || {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| InvalidImageError::Decode(e.to_string()))
    };

    // Header dimensions are checked before any pixel buffer is allocated
    let (width, height) = reader()?
        .into_dimensions()
        .map_err(|e| InvalidImageError::Decode(e.to_string()))?;
    check_dimensions(width, height)?;

    let img = reader()?
        .decode()
        .map_err(|e| InvalidImageError::Decode(e.to_string()))?;

    Ok(Frame::from(img.to_rgb8()))
}

fn check_dimensions(width: u32, height: u32) -> Result<(), InvalidImageError> {
    if width == 0 || height == 0 || u64::from(width) * u64::from(height) > MAX_PIXELS {
        return Err(InvalidImageError::Dimensions { width, height });
    }
    Ok(())
}

/// Decode a base64 payload, optionally prefixed with `data:...;base64,`
pub fn decode_base64_frame(payload: &str) -> Result<Frame, InvalidImageError> {
    let encoded = strip_data_url_prefix(payload);
    if encoded.is_empty() {
        return Err(InvalidImageError::Empty);
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| InvalidImageError::Base64)?;

    decode_frame(&bytes)
}

/// Everything after the first comma is the payload, when a comma is present
fn strip_data_url_prefix(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, rest)) => rest.trim(),
        None => payload.trim(),
    }
}
