//! Turns `renderLine` callbacks into rows on a presentation surface.

use crate::arena::{ArenaRange, ArenaView};
use crate::error::{AccessViolation, BridgeError, Result};
use crate::raster::Raster;
use crate::surface::PresentationSurface;

/// One `renderLine(row, offset, length)` call from the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanlineRecord {
    pub row: u32,
    pub range: ArenaRange,
}

impl ScanlineRecord {
    pub fn new(row: u32, offset: u32, length: u32) -> Self {
        Self {
            row,
            range: ArenaRange::new(offset, length),
        }
    }

    /// Build a record from raw wasm `i32` arguments.
    pub fn from_raw(row: i32, offset: i32, length: i32) -> Self {
        Self {
            row: row as u32,
            range: ArenaRange::from_raw(offset, length),
        }
    }
}

/// Receives scanlines reported by the module during a render.
///
/// Called synchronously while the module is blocked. `arena` is only valid
/// for the duration of the call. Returning `MalformedScanline` drops the row
/// and lets the render continue; any other error aborts the render.
pub trait ScanlineConsumer: Send {
    fn on_line(&mut self, raster: Raster, arena: ArenaView<'_>, record: ScanlineRecord)
        -> Result<()>;
}

impl<C: ScanlineConsumer + ?Sized> ScanlineConsumer for Box<C> {
    fn on_line(
        &mut self,
        raster: Raster,
        arena: ArenaView<'_>,
        record: ScanlineRecord,
    ) -> Result<()> {
        (**self).on_line(raster, arena, record)
    }
}

/// The host's scanline consumer: validates each record and paints it.
pub struct LineSink<S> {
    surface: S,
}

impl<S: PresentationSurface> LineSink<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

impl<S: PresentationSurface> ScanlineConsumer for LineSink<S> {
    fn on_line(
        &mut self,
        raster: Raster,
        arena: ArenaView<'_>,
        record: ScanlineRecord,
    ) -> Result<()> {
        if record.row >= raster.height {
            return Err(BridgeError::OutOfRangeAccess(AccessViolation::Row {
                row: record.row,
                height: raster.height,
            }));
        }
        record.range.checked(arena.capacity())?;

        let expected = raster.row_bytes();
        if record.range.length as usize != expected {
            return Err(BridgeError::MalformedScanline {
                row: record.row,
                expected,
                actual: record.range.length as usize,
            });
        }

        let pixels = arena.copy_out(record.range)?;
        self.surface.put_row(record.row, &pixels)
    }
}
