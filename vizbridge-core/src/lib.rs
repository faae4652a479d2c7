//! Vizbridge Core - Host Bridge for an Embedded Vision Module
//!
//! The embedded vision engine expects a browser-like host and a sandboxed
//! filesystem. This crate supplies both and moves images across the boundary:
//!
//! - [`environment`]: the document/canvas/image capabilities, injected as a
//!   [`HostEnvironment`]
//! - [`engine`]: the [`EngineLoader`] driving the two-phase startup
//! - [`mount`]: binding a host directory into the module filesystem
//! - [`imaging`]: [`ImageIo`] converting files to module matrices and back
//! - [`matrix`]: [`MatrixHandle`], scoped ownership of module matrices
//!
//! # Example
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use vizbridge_core::{BridgeConfig, BuiltinFactory, EngineLoader, ImageEnvironment, ImageIo, WriteOptions};
//! # async fn run() -> vizbridge_core::Result<()> {
//! let loader = Arc::new(EngineLoader::with_config(
//!     Arc::new(ImageEnvironment::new()),
//!     Arc::new(BuiltinFactory::new()),
//!     BridgeConfig::new().with_mount("/work", "./fixtures"),
//! ));
//! let io = ImageIo::new(loader);
//! let image = io.read_image("./fixtures/in.png").await?;
//! io.write_image("./fixtures/out.png", &image, &WriteOptions::default()).await?;
//! image.release()?;
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod imaging;
pub mod matrix;
pub mod mount;

pub use builtin::{BuiltinFactory, BuiltinModule};
pub use config::BridgeConfig;
pub use engine::{EngineHandle, EngineLoader, EngineState};
pub use environment::{HostEnvironment, ImageEnvironment, RasterBuffer};
pub use error::{BridgeError, ModuleError, Result};
pub use imaging::{ImageIo, WriteFlag, WriteOptions};
pub use matrix::{ChannelLayout, MatSize, MatrixHandle, MatrixId};
pub use mount::MountSpec;

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber honouring `RUST_LOG` (default `info`).
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
