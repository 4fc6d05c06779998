//! The import/export contract between the host and a render module.

use crate::arena::ArenaConfig;
use std::fmt;
use wasmtime::{ExternType, FuncType, Module};

/// Namespace of every host import.
pub const IMPORT_MODULE: &str = "env";
/// The shared arena.
pub const IMPORT_MEMORY: &str = "memory";
/// `consoleLog(offset: i32, length: i32)`
pub const IMPORT_CONSOLE_LOG: &str = "consoleLog";
/// `renderLine(row: i32, offset: i32, length: i32)`
pub const IMPORT_RENDER_LINE: &str = "renderLine";
/// `render(width: i32, height: i32)`
pub const EXPORT_RENDER: &str = "render";

/// One import or export as declared by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiItem {
    pub module: Option<String>,
    pub name: String,
    pub ty: String,
}

impl fmt::Display for AbiItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}::{}: {}", module, self.name, self.ty),
            None => write!(f, "{}: {}", self.name, self.ty),
        }
    }
}

/// What a module asks of the host and offers back, checked against the
/// fixed import surface.
#[derive(Debug, Clone, Default)]
pub struct ModuleAbi {
    pub imports: Vec<AbiItem>,
    pub exports: Vec<AbiItem>,
    pub violations: Vec<String>,
}

impl ModuleAbi {
    /// Inspect `module` as if it were about to be bound to an arena of
    /// `arena.pages` pages.
    pub fn check(module: &Module, arena: ArenaConfig) -> Self {
        let mut abi = Self::default();
        let mut imports_memory = false;

        for import in module.imports() {
            let ty = import.ty();
            abi.imports.push(AbiItem {
                module: Some(import.module().to_string()),
                name: import.name().to_string(),
                ty: describe(&ty),
            });

            if import.module() != IMPORT_MODULE {
                abi.violations.push(format!(
                    "unsupported import `{}::{}`",
                    import.module(),
                    import.name()
                ));
                continue;
            }

            match (import.name(), &ty) {
                (IMPORT_MEMORY, ExternType::Memory(memory)) => {
                    imports_memory = true;
                    let pages = u64::from(arena.pages);
                    if memory.is_64() || memory.is_shared() {
                        abi.violations
                            .push("memory import must be a 32-bit unshared memory".to_string());
                    }
                    if memory.minimum() > pages {
                        abi.violations.push(format!(
                            "memory import needs at least {} pages but the arena has {}",
                            memory.minimum(),
                            pages
                        ));
                    }
                    if let Some(maximum) = memory.maximum() {
                        if maximum < pages {
                            abi.violations.push(format!(
                                "memory import allows at most {} pages but the arena has {}",
                                maximum, pages
                            ));
                        }
                    }
                }
                (IMPORT_CONSOLE_LOG, ExternType::Func(func)) if is_void_i32(func, 2) => {}
                (IMPORT_RENDER_LINE, ExternType::Func(func)) if is_void_i32(func, 3) => {}
                (IMPORT_MEMORY | IMPORT_CONSOLE_LOG | IMPORT_RENDER_LINE, _) => {
                    abi.violations.push(format!(
                        "import `{}::{}` has the wrong type: {}",
                        IMPORT_MODULE,
                        import.name(),
                        describe(&ty)
                    ));
                }
                (name, _) => {
                    abi.violations
                        .push(format!("unsupported import `{}::{}`", IMPORT_MODULE, name));
                }
            }
        }

        if !imports_memory {
            abi.violations.push(format!(
                "module does not import the shared arena as `{}::{}`",
                IMPORT_MODULE, IMPORT_MEMORY
            ));
        }

        let mut exports_render = false;
        for export in module.exports() {
            let ty = export.ty();
            abi.exports.push(AbiItem {
                module: None,
                name: export.name().to_string(),
                ty: describe(&ty),
            });
            if export.name() == EXPORT_RENDER {
                exports_render = true;
                match &ty {
                    ExternType::Func(func) if is_void_i32(func, 2) => {}
                    _ => abi.violations.push(format!(
                        "export `{}` must be func(i32, i32), found {}",
                        EXPORT_RENDER,
                        describe(&ty)
                    )),
                }
            }
        }
        if !exports_render {
            abi.violations
                .push(format!("module does not export `{}`", EXPORT_RENDER));
        }

        abi
    }

    pub fn is_compatible(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A function taking `params` i32 arguments and returning nothing.
fn is_void_i32(func: &FuncType, params: usize) -> bool {
    func.params().len() == params
        && func.params().all(|ty| ty.is_i32())
        && func.results().len() == 0
}

fn describe(ty: &ExternType) -> String {
    match ty {
        ExternType::Func(func) => {
            let params: Vec<String> = func.params().map(|p| p.to_string()).collect();
            let results: Vec<String> = func.results().map(|r| r.to_string()).collect();
            if results.is_empty() {
                format!("func({})", params.join(", "))
            } else {
                format!("func({}) -> ({})", params.join(", "), results.join(", "))
            }
        }
        ExternType::Memory(memory) => match memory.maximum() {
            Some(max) => format!("memory {}..{} pages", memory.minimum(), max),
            None => format!("memory {}.. pages", memory.minimum()),
        },
        ExternType::Global(_) => "global".to_string(),
        ExternType::Table(_) => "table".to_string(),
        #[allow(unreachable_patterns)]
        _ => "other".to_string(),
    }
}
