//! Decoded images shared between the world thread and the window thread.

use crate::error::ClientError;
use macroquad::texture::Image;
use std::fmt;
use std::sync::Arc;

/// A decoded RGBA8 image. Cheap to clone; the pixel buffer is shared.
#[derive(Clone)]
pub struct ImageHandle {
    uri: Arc<str>,
    width: u16,
    height: u16,
    rgba: Arc<[u8]>,
}

impl ImageHandle {
    pub fn new(uri: &str, width: u16, height: u16, rgba: Vec<u8>) -> Self {
        Self {
            uri: Arc::from(uri),
            width,
            height,
            rgba: Arc::from(rgba),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("uri", &self.uri)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

// Handles with the same source and size are interchangeable.
impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.width == other.width && self.height == other.height
    }
}

/// Turns fetched image bytes into pixels.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, uri: &str, bytes: &[u8]) -> Result<ImageHandle, ClientError>;
}

/// Decodes PNG/JPEG/... through macroquad's CPU-side image loader, which does
/// not need a graphics context.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacroquadDecoder;

impl ImageDecoder for MacroquadDecoder {
    fn decode(&self, uri: &str, bytes: &[u8]) -> Result<ImageHandle, ClientError> {
        let image = Image::from_file_with_format(bytes, None).map_err(|e| ClientError::Decode {
            what: format!("image {}", uri),
            reason: e.to_string(),
        })?;

        Ok(ImageHandle::new(uri, image.width, image.height, image.bytes))
    }
}
