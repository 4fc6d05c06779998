//! Error types for the render bridge.

use std::fmt;
use thiserror::Error;

/// An access the module requested that falls outside what the host lent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessViolation {
    /// A byte range that does not fit inside the shared arena.
    Arena {
        offset: u32,
        length: u32,
        capacity: usize,
    },

    /// A scanline row index outside the raster.
    Row { row: u32, height: u32 },
}

impl fmt::Display for AccessViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arena {
                offset,
                length,
                capacity,
            } => write!(
                f,
                "range {}+{} exceeds arena capacity of {} bytes",
                offset, length, capacity
            ),
            Self::Row { row, height } => {
                write!(f, "row {} outside raster of height {}", row, height)
            }
        }
    }
}

/// Errors that can occur while hosting a render module
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to instantiate render module: {0}")]
    Instantiation(String),

    /// `rows_painted` counts distinct rows left on the surface.
    #[error("Render aborted after {rows_painted} rows: {reason}")]
    RenderAborted { rows_painted: usize, reason: String },

    #[error("Malformed scanline for row {row}: expected {expected} bytes, got {actual}")]
    MalformedScanline {
        row: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Out of range access: {0}")]
    OutOfRangeAccess(AccessViolation),

    #[error("A render is already in progress on this module")]
    RenderInProgress,

    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether this error ends the render it occurred in.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedScanline { .. })
    }

    /// Map an error raised by a wasm call into the bridge's vocabulary.
    ///
    /// Host callbacks raise `BridgeError`s through wasmtime; those are
    /// recovered as-is. Anything else that unwinds the module is an abort.
    pub(crate) fn from_call(err: wasmtime::Error, rows_painted: usize) -> Self {
        let err = match err.downcast::<BridgeError>() {
            Ok(bridge) => return bridge,
            Err(err) => err,
        };
        let reason = match err.downcast_ref::<wasmtime::Trap>() {
            Some(trap) => trap.to_string(),
            None => format!("{:#}", err),
        };
        Self::RenderAborted {
            rows_painted,
            reason,
        }
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
