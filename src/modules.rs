//! Dynamic broker module loading
//!
//! Routing modules are shared objects loaded at startup with `-m`. A module
//! named `foo` is resolved as `<search-dir>/foo.so` and must export a
//! `ferry_module_init` entry point returning zero on success. Loaded
//! libraries stay alive for the life of the process.

use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Platform suffix appended to module names.
pub const MODULE_SUFFIX: &str = ".so";

/// Entry-point symbol every broker module must export.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"ferry_module_init";

/// Default search directory for relative module loads.
pub const DEFAULT_MODULE_DIR: &str = "/usr/libexec/ferryd";

type ModuleInitFn = unsafe extern "C" fn() -> c_int;

/// Errors from loading a broker module.
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("module '{name}' not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("failed to load module '{name}': {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("module '{name}' has no entry point: {reason}")]
    MissingEntry { name: String, reason: String },

    #[error("module '{name}' initialization returned {code}")]
    InitFailed { name: String, code: i32 },
}

/// Registry of loaded broker modules.
///
/// Keeps each `Library` alive so module code stays mapped, and tracks the
/// search directory used for relative loads (`-l`).
pub struct ModuleRegistry {
    search_dir: PathBuf,
    loaded: HashMap<String, Library>,
}

impl ModuleRegistry {
    pub fn new(search_dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dir: search_dir.into(),
            loaded: HashMap::new(),
        }
    }

    /// Directory used to resolve relative module names.
    pub fn search_dir(&self) -> &Path {
        &self.search_dir
    }

    /// Replace the search directory for subsequent loads.
    pub fn set_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dir = dir.into();
    }

    /// Load and initialize the named module.
    pub fn load(&mut self, name: &str) -> Result<(), ModuleLoadError> {
        if self.loaded.contains_key(name) {
            return Ok(());
        }

        let path = self.search_dir.join(format!("{}{}", name, MODULE_SUFFIX));
        if !path.exists() {
            return Err(ModuleLoadError::NotFound {
                name: name.to_string(),
                path,
            });
        }

        // SAFETY: loading a shared object runs its constructors; modules in
        // the configured search directory are trusted broker extensions.
        let library = unsafe {
            Library::new(&path).map_err(|e| ModuleLoadError::LoadFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?
        };

        let init: Symbol<ModuleInitFn> = unsafe {
            library
                .get(MODULE_ENTRY_SYMBOL)
                .map_err(|e| ModuleLoadError::MissingEntry {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?
        };

        let code = unsafe { init() };
        if code != 0 {
            return Err(ModuleLoadError::InitFailed {
                name: name.to_string(),
                code,
            });
        }

        info!(module = name, path = %path.display(), "module loaded");
        self.loaded.insert(name.to_string(), library);
        Ok(())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn loaded_modules(&self) -> Vec<&str> {
        self.loaded.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("search_dir", &self.search_dir)
            .field("loaded", &self.loaded_modules())
            .finish()
    }
}
