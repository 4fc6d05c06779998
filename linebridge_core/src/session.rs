//! One render session: a host, an arena and a single module instance.

use crate::config::BridgeConfig;
use crate::diagnostics::DiagnosticsSink;
use crate::error::{BridgeError, Result};
use crate::host::{ModuleHandle, ModuleHost, RenderReport};
use crate::line_sink::LineSink;
use crate::module::ModuleBinary;
use crate::raster::Raster;
use crate::surface::PresentationSurface;
use tracing::info;
use uuid::Uuid;

/// Everything needed to render one module, scoped to this value's lifetime.
///
/// Sessions share nothing with each other; dropping one tears down its
/// engine, arena and instance.
pub struct RenderSession {
    id: Uuid,
    config: BridgeConfig,
    handle: ModuleHandle,
}

impl RenderSession {
    /// Load the module named by `config.module.path` and bind it to `surface`.
    pub async fn open<S>(config: BridgeConfig, surface: S) -> Result<Self>
    where
        S: PresentationSurface + 'static,
    {
        let path = config.module.path.clone().ok_or_else(|| {
            BridgeError::Config("no module path configured".to_string())
        })?;
        let binary = ModuleBinary::from_file(&path).await?;
        Self::with_binary(config, &binary, surface)
    }

    /// Bind an already loaded module to `surface`.
    pub fn with_binary<S>(config: BridgeConfig, binary: &ModuleBinary, surface: S) -> Result<Self>
    where
        S: PresentationSurface + 'static,
    {
        config.validate()?;
        let id = Uuid::new_v4();
        let host = ModuleHost::new(config.limits.clone())?;
        let handle = host.instantiate(
            id,
            binary,
            config.arena,
            LineSink::new(surface),
            DiagnosticsSink::new(id, binary.name()),
        )?;

        info!(session_id = %id, module = binary.name(), "Opened render session");
        Ok(Self {
            id,
            config,
            handle,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn handle(&self) -> &ModuleHandle {
        &self.handle
    }

    /// Render the configured raster.
    pub fn render(&self) -> Result<RenderReport> {
        self.render_with(self.config.raster)
    }

    pub fn render_with(&self, raster: Raster) -> Result<RenderReport> {
        self.handle.render(raster.width, raster.height)
    }
}
