//! The shared linear memory lent to the render module.
//!
//! Both sides address the arena by plain integer offsets. Every range the
//! module reports goes through [`ArenaRange::checked`] before the host touches
//! a single byte.

use crate::error::{AccessViolation, BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use wasmtime::{AsContextMut, Memory, MemoryType};

/// Size of one WebAssembly page in bytes.
pub const WASM_PAGE_SIZE: usize = 65_536;

/// Largest page count a 32-bit linear memory can address.
pub const MAX_PAGES: u32 = 65_536;

/// Fixed size of the shared arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Number of wasm pages; used as both the initial and maximum size.
    pub pages: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self { pages: 2 } // 128 KiB
    }
}

impl ArenaConfig {
    pub fn new(pages: u32) -> Self {
        Self { pages }
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.pages as usize * WASM_PAGE_SIZE
    }

    pub fn validate(&self) -> Result<()> {
        if self.pages == 0 || self.pages > MAX_PAGES {
            return Err(BridgeError::Config(format!(
                "arena pages must be between 1 and {}, got {}",
                MAX_PAGES, self.pages
            )));
        }
        Ok(())
    }
}

/// An `(offset, length)` pair as reported across the module boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaRange {
    pub offset: u32,
    pub length: u32,
}

impl ArenaRange {
    pub fn new(offset: u32, length: u32) -> Self {
        Self { offset, length }
    }

    /// Build a range from raw wasm `i32` arguments.
    ///
    /// Wasm addresses are unsigned, so the bits are reinterpreted rather than
    /// sign-checked.
    pub fn from_raw(offset: i32, length: i32) -> Self {
        Self {
            offset: offset as u32,
            length: length as u32,
        }
    }

    /// Resolve against an arena of `capacity` bytes.
    pub fn checked(self, capacity: usize) -> Result<Range<usize>> {
        let start = self.offset as usize;
        match start.checked_add(self.length as usize) {
            Some(end) if end <= capacity => Ok(start..end),
            _ => Err(BridgeError::OutOfRangeAccess(AccessViolation::Arena {
                offset: self.offset,
                length: self.length,
                capacity,
            })),
        }
    }
}

/// Host handle to the module's linear memory.
#[derive(Debug, Clone, Copy)]
pub struct SharedArena {
    memory: Memory,
    config: ArenaConfig,
}

impl SharedArena {
    /// Allocate the arena inside `store`. Initial and maximum sizes are equal,
    /// so the module can never grow it.
    pub fn allocate(mut store: impl AsContextMut, config: ArenaConfig) -> Result<Self> {
        config.validate()?;
        let memory = Memory::new(
            store.as_context_mut(),
            MemoryType::new(config.pages, Some(config.pages)),
        )
        .map_err(|e| BridgeError::Instantiation(format!("failed to allocate arena: {}", e)))?;
        Ok(Self { memory, config })
    }

    pub fn memory(&self) -> Memory {
        self.memory
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }
}

/// Read-only window over the arena, valid only while the module is blocked.
#[derive(Debug, Clone, Copy)]
pub struct ArenaView<'a> {
    bytes: &'a [u8],
}

impl<'a> ArenaView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn slice(&self, range: ArenaRange) -> Result<&'a [u8]> {
        let range = range.checked(self.capacity())?;
        Ok(&self.bytes[range])
    }

    /// Copy a range out. The module may overwrite the arena as soon as the
    /// current callback returns, so nothing may keep a borrow past it.
    pub fn copy_out(&self, range: ArenaRange) -> Result<Vec<u8>> {
        self.slice(range).map(<[u8]>::to_vec)
    }
}
