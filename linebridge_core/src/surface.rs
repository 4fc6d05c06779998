//! Presentation surfaces that receive finished scanlines.

use crate::error::{BridgeError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Something that can show one full-width row of RGBA pixels at a time.
///
/// `pixels` is row-major RGBA with 8 bits per channel and exactly
/// `width * 4` bytes. Painting the same row twice overwrites it. A row the
/// surface cannot show is an error, and it ends the render.
pub trait PresentationSurface: Send {
    fn put_row(&mut self, row: u32, pixels: &[u8]) -> Result<()>;
}

/// A surface shared between the sink that paints it and whoever shows it.
pub type SharedSurface<S> = Arc<Mutex<S>>;

impl<S: PresentationSurface> PresentationSurface for Arc<Mutex<S>> {
    fn put_row(&mut self, row: u32, pixels: &[u8]) -> Result<()> {
        self.lock().put_row(row, pixels)
    }
}

impl<S: PresentationSurface + ?Sized> PresentationSurface for Box<S> {
    fn put_row(&mut self, row: u32, pixels: &[u8]) -> Result<()> {
        (**self).put_row(row, pixels)
    }
}

/// In-memory RGBA raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    painted: Vec<bool>,
    paint_order: Vec<u32>,
}

impl Framebuffer {
    /// Create a transparent black framebuffer.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            pixels: vec![0; stride * height as usize],
            painted: vec![false; height as usize],
            paint_order: Vec::new(),
        }
    }

    /// Wrap a new framebuffer for sharing with a line sink.
    pub fn shared(width: u32, height: u32) -> SharedSurface<Self> {
        Arc::new(Mutex::new(Self::new(width, height)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// The bytes of one row, or `None` past the bottom edge.
    pub fn row(&self, row: u32) -> Option<&[u8]> {
        if row >= self.height {
            return None;
        }
        let start = row as usize * self.stride();
        Some(&self.pixels[start..start + self.stride()])
    }

    /// RGBA value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let at = x as usize * BYTES_PER_PIXEL;
        Some([row[at], row[at + 1], row[at + 2], row[at + 3]])
    }

    pub fn is_painted(&self, row: u32) -> bool {
        self.painted.get(row as usize).copied().unwrap_or(false)
    }

    /// Rows in the order they were painted, repeats included.
    pub fn paint_order(&self) -> &[u32] {
        &self.paint_order
    }

    /// Number of distinct rows painted so far.
    pub fn painted_rows(&self) -> usize {
        self.painted.iter().filter(|p| **p).count()
    }

    /// All pixel bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }
}

impl PresentationSurface for Framebuffer {
    fn put_row(&mut self, row: u32, pixels: &[u8]) -> Result<()> {
        let stride = self.stride();
        if row >= self.height || pixels.len() != stride {
            return Err(BridgeError::InvalidRaster(format!(
                "row {} of {} bytes does not fit a {}x{} framebuffer",
                row,
                pixels.len(),
                self.width,
                self.height
            )));
        }
        let start = row as usize * stride;
        self.pixels[start..start + stride].copy_from_slice(pixels);
        self.painted[row as usize] = true;
        self.paint_order.push(row);
        Ok(())
    }
}
