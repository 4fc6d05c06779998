//! Host-side bridge for WebAssembly pixel modules.
//!
//! A render module is instantiated against a fixed import surface: one
//! shared linear memory (`env.memory`) and two callbacks (`env.consoleLog`,
//! `env.renderLine`). The host calls the module's `render(width, height)`
//! export once and then only reacts to callbacks, copying each reported
//! scanline out of the arena and painting it on a presentation surface.

pub mod abi;
pub mod arena;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod host_functions;
pub mod line_sink;
pub mod module;
pub mod raster;
pub mod session;
pub mod surface;

pub use abi::ModuleAbi;
pub use arena::{ArenaConfig, ArenaRange, ArenaView, SharedArena};
pub use config::{BridgeConfig, LimitsConfig, ModuleConfig};
pub use diagnostics::{DiagnosticsConsumer, DiagnosticsSink};
pub use error::{AccessViolation, BridgeError, Result};
pub use host::{ModuleHandle, ModuleHost, RenderReport};
pub use host_functions::RejectedScanline;
pub use line_sink::{LineSink, ScanlineConsumer, ScanlineRecord};
pub use module::ModuleBinary;
pub use raster::Raster;
pub use session::RenderSession;
pub use surface::{Framebuffer, PresentationSurface, SharedSurface};
