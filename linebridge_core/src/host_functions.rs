//! Host functions imported by render modules.
//!
//! The import surface is fixed: `env.memory`, `env.consoleLog` and
//! `env.renderLine`. Both callbacks copy what they need out of the arena
//! before returning, since the module is free to overwrite it afterwards.

use crate::abi::{IMPORT_CONSOLE_LOG, IMPORT_MEMORY, IMPORT_MODULE, IMPORT_RENDER_LINE};
use crate::arena::{ArenaRange, ArenaView, SharedArena};
use crate::diagnostics::DiagnosticsConsumer;
use crate::error::{BridgeError, Result};
use crate::line_sink::{ScanlineConsumer, ScanlineRecord};
use crate::raster::Raster;
use std::collections::BTreeSet;
use tracing::{error, trace, warn};
use uuid::Uuid;
use wasmtime::{AsContext, Caller, Linker};

/// A scanline the sink refused without aborting the render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedScanline {
    pub row: u32,
    pub expected: usize,
    pub actual: usize,
}

/// Counters gathered while a render is in flight.
#[derive(Debug, Clone, Default)]
pub struct RenderProgress {
    /// Accepted `renderLine` calls, replays included.
    pub lines_painted: usize,
    /// Distinct rows now showing module output.
    pub rows: BTreeSet<u32>,
    pub log_entries: usize,
    pub rejected: Vec<RejectedScanline>,
}

/// State shared with host functions
pub struct HostState {
    session_id: Uuid,
    scanlines: Box<dyn ScanlineConsumer>,
    diagnostics: Box<dyn DiagnosticsConsumer>,

    /// Set for the duration of a render call.
    raster: Option<Raster>,

    progress: RenderProgress,
}

impl HostState {
    pub fn new(
        session_id: Uuid,
        scanlines: Box<dyn ScanlineConsumer>,
        diagnostics: Box<dyn DiagnosticsConsumer>,
    ) -> Self {
        Self {
            session_id,
            scanlines,
            diagnostics,
            raster: None,
            progress: RenderProgress::default(),
        }
    }

    /// Start accepting scanlines for `raster`.
    pub fn begin_render(&mut self, raster: Raster) {
        self.raster = Some(raster);
        self.progress = RenderProgress::default();
    }

    /// Stop accepting scanlines and hand back what was gathered.
    pub fn end_render(&mut self) -> RenderProgress {
        self.raster = None;
        std::mem::take(&mut self.progress)
    }

    fn deliver_line(&mut self, arena: ArenaView<'_>, record: ScanlineRecord) -> Result<()> {
        let raster = self.raster.ok_or_else(|| {
            BridgeError::Instantiation(format!(
                "module called `{}` outside of a render",
                IMPORT_RENDER_LINE
            ))
        })?;

        trace!(
            session_id = %self.session_id,
            row = record.row,
            offset = record.range.offset,
            length = record.range.length,
            "renderLine"
        );

        match self.scanlines.on_line(raster, arena, record) {
            Ok(()) => {
                self.progress.lines_painted += 1;
                self.progress.rows.insert(record.row);
                Ok(())
            }
            Err(e) if !e.is_fatal() => {
                warn!(session_id = %self.session_id, row = record.row, "Dropped scanline: {}", e);
                if let BridgeError::MalformedScanline {
                    row,
                    expected,
                    actual,
                } = e
                {
                    self.progress.rejected.push(RejectedScanline {
                        row,
                        expected,
                        actual,
                    });
                }
                Ok(())
            }
            Err(e) => {
                error!(session_id = %self.session_id, row = record.row, "Fatal scanline: {}", e);
                Err(e)
            }
        }
    }

    fn deliver_log(&mut self, arena: ArenaView<'_>, range: ArenaRange) -> Result<()> {
        let bytes = arena.slice(range).map_err(|e| {
            error!(session_id = %self.session_id, "Fatal diagnostic: {}", e);
            e
        })?;
        self.diagnostics.on_log(bytes);
        self.progress.log_entries += 1;
        Ok(())
    }
}

/// Bind the complete import surface to `linker`.
pub fn register_host_functions(
    linker: &mut Linker<HostState>,
    store: impl AsContext<Data = HostState>,
    arena: SharedArena,
) -> Result<()> {
    linker
        .define(store, IMPORT_MODULE, IMPORT_MEMORY, arena.memory())
        .map_err(|e| host_error(IMPORT_MEMORY, e))?;

    // consoleLog(offset: i32, length: i32)
    linker
        .func_wrap(
            IMPORT_MODULE,
            IMPORT_CONSOLE_LOG,
            move |mut caller: Caller<'_, HostState>, offset: i32, length: i32| -> wasmtime::Result<()> {
                let (bytes, state) = arena.memory().data_and_store_mut(&mut caller);
                state
                    .deliver_log(ArenaView::new(bytes), ArenaRange::from_raw(offset, length))
                    .map_err(wasmtime::Error::new)
            },
        )
        .map_err(|e| host_error(IMPORT_CONSOLE_LOG, e))?;

    // renderLine(row: i32, offset: i32, length: i32)
    linker
        .func_wrap(
            IMPORT_MODULE,
            IMPORT_RENDER_LINE,
            move |mut caller: Caller<'_, HostState>,
                  row: i32,
                  offset: i32,
                  length: i32|
                  -> wasmtime::Result<()> {
                let (bytes, state) = arena.memory().data_and_store_mut(&mut caller);
                state
                    .deliver_line(
                        ArenaView::new(bytes),
                        ScanlineRecord::from_raw(row, offset, length),
                    )
                    .map_err(wasmtime::Error::new)
            },
        )
        .map_err(|e| host_error(IMPORT_RENDER_LINE, e))?;

    Ok(())
}

fn host_error(name: &str, err: wasmtime::Error) -> BridgeError {
    BridgeError::Instantiation(format!(
        "failed to register `{}::{}`: {}",
        IMPORT_MODULE, name, err
    ))
}
