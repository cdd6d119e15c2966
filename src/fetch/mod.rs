//! Tile image fetching.
//!
//! An [`ImageFetcher`] turns a tile URL into decoded RGBA pixels. The loader
//! runs every fetch on its own tokio task; aborting that task is how an
//! in-flight fetch is cancelled, so implementations need no cancellation
//! logic of their own.

mod http;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;

pub use http::{HttpImageFetcher, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT};

// =============================================================================
// Decoded Image
// =============================================================================

/// Decoded tile imagery as tightly packed RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// `width * height * 4` bytes, row-major, top row first
    pub pixels: Bytes,
}

impl DecodedImage {
    /// Wrap an RGBA8 buffer, checking its length against the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: impl Into<Bytes>) -> Result<Self, FetchError> {
        let pixels = pixels.into();
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(FetchError::Decode(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decode an encoded image (PNG or JPEG) into RGBA8.
    pub fn decode(data: &[u8]) -> Result<Self, FetchError> {
        let img = image::load_from_memory(data).map_err(|e| FetchError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            pixels: Bytes::from(rgba.into_raw()),
        })
    }
}

// =============================================================================
// ImageFetcher Trait
// =============================================================================

/// Source of decoded tile imagery.
///
/// This abstraction allows the loader to work with different transports
/// (HTTP, local files, in-memory fixtures) without being tied to one.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch and decode the image at `url`.
    async fn fetch(&self, url: &str) -> Result<DecodedImage, FetchError>;
}
