//! Matrix storage of the built-in module

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::engine::module::MatrixAllocator;
use crate::environment::RasterBuffer;
use crate::error::{ModuleError, Result};
use crate::matrix::{ChannelLayout, GenerationalArena, MatSize, MatrixId};

struct Mat {
    size: MatSize,
    layout: ChannelLayout,
    data: Vec<u8>,
}

/// Generation-checked matrix allocator.
pub struct MatrixStore {
    mats: Mutex<GenerationalArena<Mat>>,
}

impl MatrixStore {
    pub fn new() -> Self {
        Self {
            mats: Mutex::new(GenerationalArena::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GenerationalArena<Mat>> {
        self.mats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ModuleError::ShapeMismatch { expected, actual }.into());
    }
    Ok(())
}

impl MatrixAllocator for MatrixStore {
    fn from_raster(&self, raster: &RasterBuffer) -> Result<MatrixId> {
        let mat = Mat {
            size: raster.size(),
            layout: ChannelLayout::Rgba,
            data: raster.as_bytes().to_vec(),
        };
        let id = self.lock().insert(mat);
        debug!(matrix = %id, width = raster.width(), height = raster.height(), "Matrix from raster");
        Ok(id)
    }

    fn allocate(&self, size: MatSize, layout: ChannelLayout) -> Result<MatrixId> {
        let mat = Mat {
            size,
            layout,
            data: vec![0; layout.buffer_len(size)],
        };
        Ok(self.lock().insert(mat))
    }

    fn size(&self, id: MatrixId) -> Result<MatSize> {
        Ok(self.lock().get(id)?.size)
    }

    fn layout(&self, id: MatrixId) -> Result<ChannelLayout> {
        Ok(self.lock().get(id)?.layout)
    }

    fn read_pixels(&self, id: MatrixId) -> Result<Vec<u8>> {
        Ok(self.lock().get(id)?.data.clone())
    }

    fn write_pixels(&self, id: MatrixId, data: &[u8]) -> Result<()> {
        let mut mats = self.lock();
        let mat = mats.get_mut(id)?;
        check_len(mat.data.len(), data.len())?;
        mat.data.copy_from_slice(data);
        Ok(())
    }

    fn render(&self, id: MatrixId, canvas: &mut RasterBuffer) -> Result<()> {
        let mats = self.lock();
        let mat = mats.get(id)?;
        check_len(mat.size.area() * 4, canvas.as_bytes().len())?;

        let channels = mat.layout.channels();
        for (src, dst) in mat
            .data
            .chunks_exact(channels)
            .zip(canvas.as_bytes_mut().chunks_exact_mut(4))
        {
            let rgba = match mat.layout {
                ChannelLayout::Gray => [src[0], src[0], src[0], 255],
                ChannelLayout::Rgb => [src[0], src[1], src[2], 255],
                ChannelLayout::Rgba => [src[0], src[1], src[2], src[3]],
            };
            dst.copy_from_slice(&rgba);
        }
        Ok(())
    }

    fn release(&self, id: MatrixId) -> Result<()> {
        self.lock().remove(id)?;
        debug!(matrix = %id, "Matrix released");
        Ok(())
    }

    fn live_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for MatrixStore {
    fn default() -> Self {
        Self::new()
    }
}
