//! Embedded Module Contract - What the Bridge Expects From the Engine
//!
//! The vision engine is a precompiled module hosted in-process. The bridge
//! never looks inside it; it only drives the capabilities declared here.
//!
//! # Lifecycle Contract:
//! 1. [`ModuleFactory::instantiate`] creates the module. Its code has not run
//!    yet, only its filesystem table exists.
//! 2. The loader prepares the mount through [`EmbeddedModule::fs`] (the
//!    pre-initialization hook).
//! 3. [`EmbeddedModule::run_initializers`] runs the module's own setup. Its
//!    completion is the ready hook.
//!
//! Implementations must not touch the filesystem from `instantiate`, since the
//! mount does not exist yet at that point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::environment::{HostEnvironment, RasterBuffer};
use crate::error::{ModuleError, Result};
use crate::matrix::{ChannelLayout, MatSize, MatrixId};

/// The module's sandboxed filesystem.
///
/// Paths are `/`-separated. Relative paths resolve against [`cwd`](Self::cwd).
/// Paths at or below a mount point resolve into the bound host directory.
pub trait ModuleFs: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    /// Create a single directory; the parent must exist.
    fn mkdir(&self, path: &str) -> std::result::Result<(), ModuleError>;

    /// Bind the host directory `host_root` at `virtual_root`.
    fn mount_host(&self, host_root: &Path, virtual_root: &str)
        -> std::result::Result<(), ModuleError>;

    fn chdir(&self, path: &str) -> std::result::Result<(), ModuleError>;

    fn cwd(&self) -> String;

    /// Host path behind a module path, if it lies under a host mount.
    fn resolve_host(&self, path: &str) -> std::result::Result<PathBuf, ModuleError>;

    fn read_file(&self, path: &str) -> std::result::Result<Vec<u8>, ModuleError>;

    fn write_file(&self, path: &str, data: &[u8]) -> std::result::Result<(), ModuleError>;
}

/// The module's matrix allocator.
///
/// Ids are generation-checked: operations on a released id fail with
/// [`BridgeError::UseAfterRelease`](crate::BridgeError::UseAfterRelease),
/// releasing one again fails with
/// [`BridgeError::DoubleRelease`](crate::BridgeError::DoubleRelease).
pub trait MatrixAllocator: Send + Sync {
    /// Convert host RGBA pixels into a new 4-channel matrix.
    fn from_raster(&self, raster: &RasterBuffer) -> Result<MatrixId>;

    /// Allocate a zeroed matrix.
    fn allocate(&self, size: MatSize, layout: ChannelLayout) -> Result<MatrixId>;

    fn size(&self, id: MatrixId) -> Result<MatSize>;

    fn layout(&self, id: MatrixId) -> Result<ChannelLayout>;

    fn read_pixels(&self, id: MatrixId) -> Result<Vec<u8>>;

    fn write_pixels(&self, id: MatrixId, data: &[u8]) -> Result<()>;

    /// Draw the matrix onto an RGBA canvas of the same size.
    fn render(&self, id: MatrixId, canvas: &mut RasterBuffer) -> Result<()>;

    fn release(&self, id: MatrixId) -> Result<()>;

    /// Number of matrices not yet released.
    fn live_count(&self) -> usize;
}

/// An instantiated embedded module.
#[async_trait]
pub trait EmbeddedModule: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    fn fs(&self) -> Arc<dyn ModuleFs>;

    fn matrices(&self) -> Arc<dyn MatrixAllocator>;

    /// Run the module's internal setup. Resolves once the runtime is ready.
    async fn run_initializers(&self) -> anyhow::Result<()>;

    /// Returns `true` when the image capabilities are usable.
    fn has_capabilities(&self) -> bool;
}

/// Creates embedded module instances.
#[async_trait]
pub trait ModuleFactory: Send + Sync {
    /// Create a module bound to the installed host environment.
    async fn instantiate(
        &self,
        environment: Arc<dyn HostEnvironment>,
    ) -> anyhow::Result<Arc<dyn EmbeddedModule>>;
}
