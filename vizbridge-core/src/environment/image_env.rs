//! Host environment backed by the `image` crate codecs

use std::io::Cursor;
use std::sync::OnceLock;

use anyhow::{bail, Context};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::{debug, info};

use super::{HostEnvironment, RasterBuffer};
use crate::error::{BridgeError, Result};

/// [`HostEnvironment`] implementation using the `image` crate for decode and
/// encode. Any format the crate can write is accepted by MIME type.
#[derive(Debug, Default)]
pub struct ImageEnvironment {
    installed: OnceLock<()>,
}

impl ImageEnvironment {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostEnvironment for ImageEnvironment {
    fn install(&self) -> anyhow::Result<()> {
        if self.is_installed() {
            return Ok(());
        }
        // The module renders through canvases that end up as PNG by default.
        if !ImageFormat::Png.writing_enabled() || !ImageFormat::Png.reading_enabled() {
            bail!("PNG codec is not available in this build");
        }
        self.installed.get_or_init(|| {
            info!("Installed image host environment");
        });
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.installed.get().is_some()
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<RasterBuffer> {
        let image = image::load_from_memory(bytes).context("unrecognised or corrupt image")?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!(width, height, "Decoded raster");
        Ok(RasterBuffer::from_rgba(width, height, rgba.into_raw())?)
    }

    fn encode(&self, canvas: &RasterBuffer, format: &str) -> Result<Vec<u8>> {
        let unsupported = |reason: &str| BridgeError::Encode {
            format: format.to_string(),
            reason: reason.to_string(),
        };
        let image_format = ImageFormat::from_mime_type(format)
            .ok_or_else(|| unsupported("unknown MIME type"))?;
        if !image_format.writing_enabled() {
            return Err(unsupported("no encoder available for this format"));
        }

        let rgba = RgbaImage::from_raw(canvas.width(), canvas.height(), canvas.as_bytes().to_vec())
            .ok_or_else(|| unsupported("canvas buffer does not match its dimensions"))?;
        let image = match image_format {
            // No alpha channel in JPEG.
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8()),
            _ => DynamicImage::ImageRgba8(rgba),
        };

        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, image_format)
            .map_err(|e| unsupported(&e.to_string()))?;
        debug!(format, bytes = out.get_ref().len(), "Encoded canvas");
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> RasterBuffer {
        let mut buf = RasterBuffer::new(4, 4);
        for (i, px) in buf.as_bytes_mut().chunks_mut(4).enumerate() {
            let v = if i % 2 == 0 { 255 } else { 0 };
            px.copy_from_slice(&[v, v, v, 255]);
        }
        buf
    }

    #[test]
    fn test_install_idempotent() {
        let env = ImageEnvironment::new();
        assert!(!env.is_installed());
        env.install().unwrap();
        env.install().unwrap();
        assert!(env.is_installed());
    }

    #[test]
    fn test_png_round_trip() {
        let env = ImageEnvironment::new();
        let canvas = checker();
        let bytes = env.encode(&canvas, "image/png").unwrap();
        let decoded = env.decode(&bytes).unwrap();
        assert_eq!(decoded, canvas);
    }

    #[test]
    fn test_jpeg_drops_alpha_but_keeps_size() {
        let env = ImageEnvironment::new();
        let bytes = env.encode(&checker(), "image/jpeg").unwrap();
        let decoded = env.decode(&bytes).unwrap();
        assert_eq!(decoded.size(), checker().size());
    }

    #[test]
    fn test_unknown_format_rejected() {
        let env = ImageEnvironment::new();
        let err = env.encode(&checker(), "image/x-made-up").unwrap_err();
        match err {
            BridgeError::Encode { format, .. } => assert_eq!(format, "image/x-made-up"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_garbage() {
        let env = ImageEnvironment::new();
        assert!(env.decode(b"definitely not an image").is_err());
    }
}
