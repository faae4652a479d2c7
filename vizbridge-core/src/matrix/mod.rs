//! Matrix Handles - Scoped Ownership of Module-Owned Image Data
//!
//! Matrices live inside the embedded module and are never reclaimed
//! automatically. A [`MatrixHandle`] owns exactly one of them and releases it
//! when dropped, so every exit path gives the memory back to the module.
//!
//! # Ownership Pattern: Scope Guard
//! - `Drop` releases the matrix, errors are logged
//! - [`MatrixHandle::release`] releases explicitly and reports errors
//! - [`MatrixHandle::leak`] opts out and hands the raw [`MatrixId`] to the caller
//!
//! Raw ids are generation-checked by the allocator (see [`arena`]), so a stale
//! id is rejected instead of touching whatever now occupies its slot.

pub mod arena;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::module::MatrixAllocator;
use crate::environment::RasterBuffer;
use crate::error::Result;

pub use arena::GenerationalArena;

/// Generation-checked identifier of a matrix inside the embedded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixId {
    index: u32,
    generation: u32,
}

impl MatrixId {
    /// Build an id from its slot index and generation.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the allocator.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for MatrixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Width and height of a matrix, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatSize {
    pub width: u32,
    pub height: u32,
}

impl MatSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this size.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Channel layout of a matrix, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Gray,
    Rgb,
    Rgba,
}

impl ChannelLayout {
    /// Bytes per pixel.
    pub fn channels(&self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }

    /// Expected buffer length for a matrix of `size` in this layout.
    pub fn buffer_len(&self, size: MatSize) -> usize {
        size.area() * self.channels()
    }
}

/// Owning handle to a module-managed matrix.
///
/// The handle is not `Clone`: exactly one owner is responsible for the
/// release. Borrow it (`&MatrixHandle`) to let other code read or render it.
pub struct MatrixHandle {
    id: MatrixId,
    allocator: Arc<dyn MatrixAllocator>,
    released: bool,
}

impl MatrixHandle {
    /// Take ownership of `id`, which must have been issued by `allocator`.
    pub fn adopt(id: MatrixId, allocator: Arc<dyn MatrixAllocator>) -> Self {
        debug!(matrix = %id, "Adopting matrix");
        Self {
            id,
            allocator,
            released: false,
        }
    }

    /// Allocate a zeroed matrix and take ownership of it.
    pub fn allocate(
        allocator: Arc<dyn MatrixAllocator>,
        size: MatSize,
        layout: ChannelLayout,
    ) -> Result<Self> {
        let id = allocator.allocate(size, layout)?;
        Ok(Self::adopt(id, allocator))
    }

    /// The raw id of the owned matrix.
    pub fn id(&self) -> MatrixId {
        self.id
    }

    pub fn size(&self) -> Result<MatSize> {
        self.allocator.size(self.id)
    }

    pub fn layout(&self) -> Result<ChannelLayout> {
        self.allocator.layout(self.id)
    }

    /// Copy the matrix pixels out of the module, row-major.
    pub fn read_pixels(&self) -> Result<Vec<u8>> {
        self.allocator.read_pixels(self.id)
    }

    /// Overwrite the matrix pixels; `data` must match size and layout.
    pub fn write_pixels(&self, data: &[u8]) -> Result<()> {
        self.allocator.write_pixels(self.id, data)
    }

    /// Render the matrix as RGBA onto `canvas`.
    pub fn render(&self, canvas: &mut RasterBuffer) -> Result<()> {
        self.allocator.render(self.id, canvas)
    }

    /// Release the matrix now and report any failure.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        debug!(matrix = %self.id, "Releasing matrix");
        self.allocator.release(self.id)
    }

    /// Give up ownership without releasing; the caller must release the id.
    pub fn leak(mut self) -> MatrixId {
        self.released = true;
        self.id
    }
}

impl Drop for MatrixHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.allocator.release(self.id) {
            warn!(matrix = %self.id, error = %e, "Failed to release matrix on drop");
        }
    }
}

impl fmt::Debug for MatrixHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixHandle")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
