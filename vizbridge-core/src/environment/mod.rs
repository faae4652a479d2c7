//! Host Environment Adapter
//!
//! The embedded module expects a browser-like host: images it can read
//! pixels from, canvases it can draw onto, and encoders for the results.
//! Instead of installing those globally, the adapter is an explicit
//! capability object injected into the [`EngineLoader`](crate::EngineLoader).
//!
//! # Capability Contract:
//! - `install()` must be idempotent and run before the module is instantiated
//! - `decode()` turns encoded file bytes into an RGBA [`RasterBuffer`]
//! - `create_canvas()` allocates a blank RGBA surface for the module to render on
//! - `encode()` turns a canvas into file bytes for a MIME type, or fails with
//!   [`BridgeError::Encode`](crate::BridgeError::Encode)

mod image_env;
mod raster;

pub use image_env::ImageEnvironment;
pub use raster::RasterBuffer;

use crate::error::Result;
use crate::matrix::MatSize;

/// Default output format of the marshalling layer.
pub const DEFAULT_FORMAT: &str = "image/png";

/// Document/canvas/image capabilities the embedded module relies on.
pub trait HostEnvironment: Send + Sync {
    /// Make the capabilities available. Safe to call any number of times.
    fn install(&self) -> anyhow::Result<()>;

    /// Returns `true` once [`install`](Self::install) has succeeded.
    fn is_installed(&self) -> bool;

    /// Decode an encoded image into RGBA pixels.
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<RasterBuffer>;

    /// Allocate a transparent canvas of the given size.
    fn create_canvas(&self, size: MatSize) -> RasterBuffer {
        RasterBuffer::new(size.width, size.height)
    }

    /// Encode a canvas as `format` (a MIME type such as `image/png`).
    fn encode(&self, canvas: &RasterBuffer, format: &str) -> Result<Vec<u8>>;
}
