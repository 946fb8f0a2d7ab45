//! Plugin loading and the registry of loaded plugins.
//!
//! Loading validates shape up front: the manifest must pass `manifest`
//! checks, the entry script must compile, and the compiled script must
//! define `probe` taking exactly one argument. Anything else is a
//! `LoadError` — reported to diagnostics, plugin skipped, process
//! unaffected. The registry itself is append-only during load and read-only
//! afterwards, so probe passes share it without locking.

use rhai::AST;
use std::path::Path;
use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::error::LoadError;
use crate::manifest::{self, PluginManifest};
use crate::runtime;

/// A validated, compiled plugin. Immutable after load.
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub(crate) ast: AST,
}

/// The ordered set of loaded plugins, at most one per id.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<LoadedPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every valid plugin under `dir`, in sorted directory order.
    /// Rejections are reported to diagnostics and skipped.
    pub fn load_from_dir(dir: &Path, diagnostics: &Diagnostics) -> Self {
        let mut registry = Self::new();

        if !dir.exists() {
            tracing::warn!("plugins directory {} does not exist", dir.display());
            return registry;
        }

        for plugin_dir in manifest::discover_plugin_dirs(dir) {
            let loaded = match load_plugin_dir(&plugin_dir) {
                Ok(loaded) => loaded,
                Err(error) => {
                    diagnostics.error("loader", &error.to_string());
                    continue;
                }
            };
            let id = loaded.manifest.id.clone();
            if let Err(error) = registry.register(loaded) {
                diagnostics.error("loader", &error.to_string());
            } else {
                tracing::debug!("loaded plugin \"{id}\"");
            }
        }

        registry
    }

    /// Add a plugin. Duplicate ids are rejected: the first registration
    /// wins and the caller reports the loser.
    pub(crate) fn register(&mut self, plugin: LoadedPlugin) -> Result<(), LoadError> {
        if self.get(&plugin.manifest.id).is_some() {
            return Err(LoadError::DuplicateId {
                id: plugin.manifest.id.clone(),
            });
        }
        self.plugins.push(Arc::new(plugin));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<LoadedPlugin>> {
        self.plugins.iter().find(|p| p.manifest.id == id)
    }

    /// Plugins in registration order.
    pub fn plugins(&self) -> &[Arc<LoadedPlugin>] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Turn one plugin directory into a `LoadedPlugin`.
fn load_plugin_dir(plugin_dir: &Path) -> Result<LoadedPlugin, LoadError> {
    let manifest = manifest::read_manifest(plugin_dir)?;
    let id = manifest.id.clone();

    let entry_path = plugin_dir.join(&manifest.main);
    let code = std::fs::read_to_string(&entry_path).map_err(|e| LoadError::ScriptRead {
        id: id.clone(),
        message: format!("{}: {e}", entry_path.display()),
    })?;

    let ast = runtime::compile(&code).map_err(|message| LoadError::ScriptCompile {
        id: id.clone(),
        message,
    })?;

    if !runtime::defines_probe(&ast) {
        return Err(LoadError::MissingProbe { id });
    }

    Ok(LoadedPlugin { manifest, ast })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
