//! Raster dimensions for a single render invocation.

use crate::error::{BridgeError, Result};
use crate::surface::BYTES_PER_PIXEL;
use serde::{Deserialize, Serialize};

/// Width and height of the target image, fixed for one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
}

impl Default for Raster {
    /// The default size of an HTML canvas.
    fn default() -> Self {
        Self {
            width: 300,
            height: 150,
        }
    }
}

impl Raster {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one full scanline.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Check the raster is usable against an arena of `capacity` bytes.
    ///
    /// Dimensions must be positive, fit the `i32` arguments of the entry
    /// point, and one scanline must fit in the arena.
    pub fn validate(&self, capacity: usize) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BridgeError::InvalidRaster(format!(
                "dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > i32::MAX as u32 || self.height > i32::MAX as u32 {
            return Err(BridgeError::InvalidRaster(format!(
                "{}x{} does not fit the module's i32 arguments",
                self.width, self.height
            )));
        }
        if self.row_bytes() > capacity {
            return Err(BridgeError::InvalidRaster(format!(
                "a {}-pixel scanline needs {} bytes but the arena holds {}",
                self.width,
                self.row_bytes(),
                capacity
            )));
        }
        Ok(())
    }
}
