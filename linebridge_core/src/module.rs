//! Loading render module binaries.

use crate::error::{BridgeError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use wasmtime::{Engine, Module};

/// The raw bytes of a render module, either binary wasm or WAT text.
#[derive(Debug, Clone)]
pub struct ModuleBinary {
    name: String,
    bytes: Vec<u8>,
}

impl ModuleBinary {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a module from disk. This is the only suspension point before a
    /// render; everything after instantiation is synchronous.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading render module from {:?}", path);
        let bytes = fs::read(path).await?;
        Ok(Self {
            name: module_name(path),
            bytes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile for `engine`. WAT text is translated first; binary input passes
    /// through untouched.
    pub fn compile(&self, engine: &Engine) -> Result<Module> {
        let binary = wat::parse_bytes(&self.bytes).map_err(|e| {
            BridgeError::Instantiation(format!("{} is not valid WebAssembly: {}", self.name, e))
        })?;
        Module::from_binary(engine, &binary).map_err(|e| {
            BridgeError::Instantiation(format!("failed to compile {}: {:#}", self.name, e))
        })
    }
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}
