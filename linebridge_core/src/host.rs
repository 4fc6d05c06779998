//! Instantiating render modules and driving their entry point.

use crate::abi::{ModuleAbi, EXPORT_RENDER};
use crate::arena::{ArenaConfig, SharedArena};
use crate::config::LimitsConfig;
use crate::diagnostics::DiagnosticsConsumer;
use crate::error::{BridgeError, Result};
use crate::host_functions::{register_host_functions, HostState, RejectedScanline};
use crate::line_sink::ScanlineConsumer;
use crate::module::ModuleBinary;
use crate::raster::Raster;
use parking_lot::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;
use wasmtime::{Engine, Linker, Store, TypedFunc};

/// Outcome of a render that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderReport {
    pub raster: Raster,
    /// Successful `renderLine` calls, replays included.
    pub lines_painted: usize,
    /// Distinct rows painted.
    pub rows_painted: usize,
    pub log_entries: usize,
    pub rejected: Vec<RejectedScanline>,
}

impl RenderReport {
    /// Whether every reported scanline was accepted.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Compiles and instantiates render modules against the fixed import set.
pub struct ModuleHost {
    engine: Engine,
    limits: LimitsConfig,
}

impl ModuleHost {
    pub fn new(limits: LimitsConfig) -> Result<Self> {
        let mut engine_config = wasmtime::Config::default();
        engine_config.consume_fuel(limits.fuel.is_some());
        let engine = Engine::new(&engine_config)
            .map_err(|e| BridgeError::Instantiation(format!("failed to create engine: {}", e)))?;

        Ok(Self { engine, limits })
    }

    /// Report the module's imports and exports without instantiating it.
    pub fn inspect(&self, binary: &ModuleBinary, arena: ArenaConfig) -> Result<ModuleAbi> {
        let module = binary.compile(&self.engine)?;
        Ok(ModuleAbi::check(&module, arena))
    }

    /// Allocate an arena, bind it and both callbacks as the module's only
    /// imports, and instantiate.
    pub fn instantiate(
        &self,
        session_id: Uuid,
        binary: &ModuleBinary,
        arena: ArenaConfig,
        scanlines: impl ScanlineConsumer + 'static,
        diagnostics: impl DiagnosticsConsumer + 'static,
    ) -> Result<ModuleHandle> {
        let module = binary.compile(&self.engine)?;

        let abi = ModuleAbi::check(&module, arena);
        if !abi.is_compatible() {
            return Err(BridgeError::Instantiation(format!(
                "{} does not satisfy the host ABI: {}",
                binary.name(),
                abi.violations.join("; ")
            )));
        }

        let mut store = Store::new(
            &self.engine,
            HostState::new(session_id, Box::new(scanlines), Box::new(diagnostics)),
        );
        if let Some(fuel) = self.limits.fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Instantiation(e.to_string()))?;
        }

        let shared = SharedArena::allocate(&mut store, arena)?;
        let mut linker = Linker::new(&self.engine);
        register_host_functions(&mut linker, &store, shared)?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| BridgeError::Instantiation(format!("{:#}", e)))?;
        let render = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, EXPORT_RENDER)
            .map_err(|e| BridgeError::Instantiation(e.to_string()))?;

        debug!(
            session_id = %session_id,
            module = binary.name(),
            arena_bytes = shared.capacity(),
            "Instantiated render module"
        );

        Ok(ModuleHandle {
            session_id,
            name: binary.name().to_string(),
            arena: shared,
            fuel: self.limits.fuel,
            render,
            store: Mutex::new(store),
        })
    }
}

/// An instantiated render module bound to its arena.
pub struct ModuleHandle {
    session_id: Uuid,
    name: String,
    arena: SharedArena,
    fuel: Option<u64>,
    render: TypedFunc<(i32, i32), ()>,
    store: Mutex<Store<HostState>>,
}

impl ModuleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke `render(width, height)` and block until the module returns.
    ///
    /// Scanlines painted before a failure stay painted. Overlapping calls are
    /// refused with `RenderInProgress`.
    pub fn render(&self, width: u32, height: u32) -> Result<RenderReport> {
        let mut store = self
            .store
            .try_lock()
            .ok_or(BridgeError::RenderInProgress)?;

        let raster = Raster::new(width, height);
        raster.validate(self.arena.capacity())?;

        if let Some(fuel) = self.fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::RenderAborted {
                    rows_painted: 0,
                    reason: e.to_string(),
                })?;
        }

        info!(
            session_id = %self.session_id,
            module = %self.name,
            width, height,
            "Render started"
        );

        store.data_mut().begin_render(raster);
        let outcome = self
            .render
            .call(&mut *store, (width as i32, height as i32));
        let progress = store.data_mut().end_render();

        match outcome {
            Ok(()) => {
                info!(
                    session_id = %self.session_id,
                    lines = progress.lines_painted,
                    rows = progress.rows.len(),
                    rejected = progress.rejected.len(),
                    "Render finished"
                );
                Ok(RenderReport {
                    raster,
                    lines_painted: progress.lines_painted,
                    rows_painted: progress.rows.len(),
                    log_entries: progress.log_entries,
                    rejected: progress.rejected,
                })
            }
            Err(e) => {
                let err = BridgeError::from_call(e, progress.rows.len());
                error!(session_id = %self.session_id, "Render failed: {}", err);
                Err(err)
            }
        }
    }
}
