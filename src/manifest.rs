//! Plugin manifest parsing and validation.
//!
//! A plugin is a directory named by its id, containing a `manifest.json`
//! and the entry script it points at. The manifest is the only thing the
//! host trusts a plugin directory to describe about itself, so everything
//! in it is validated before the script is even read.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::LoadError;

pub(crate) const MANIFEST_FILE: &str = "manifest.json";

/// Plugin manifest as declared in `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Stable provider identifier; must match the directory name.
    pub id: String,
    /// Entry script, relative to the plugin directory.
    #[serde(default = "default_main")]
    pub main: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_main() -> String {
    "plugin.rhai".to_string()
}

/// Validate a parsed manifest against the directory it was found in.
pub(crate) fn validate_manifest(manifest: &PluginManifest, dir_name: &str) -> Result<(), String> {
    if manifest.id.is_empty() {
        return Err("id is empty".into());
    }
    if manifest.id != dir_name {
        return Err(format!(
            "id \"{}\" does not match directory name \"{}\"",
            manifest.id, dir_name
        ));
    }
    if manifest.main.is_empty() {
        return Err("main is empty".into());
    }
    // main must not escape the plugin directory
    if is_path_escape(&manifest.main) {
        return Err(format!("main \"{}\" attempts path traversal", manifest.main));
    }
    Ok(())
}

/// Parse and validate the manifest in one plugin directory.
pub(crate) fn read_manifest(plugin_dir: &Path) -> Result<PluginManifest, LoadError> {
    let dir_name = plugin_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let raw = std::fs::read_to_string(plugin_dir.join(MANIFEST_FILE)).map_err(|e| {
        LoadError::ManifestRead {
            dir: dir_name.clone(),
            message: e.to_string(),
        }
    })?;

    let manifest: PluginManifest =
        serde_json::from_str(&raw).map_err(|e| LoadError::ManifestInvalid {
            dir: dir_name.clone(),
            message: e.to_string(),
        })?;

    validate_manifest(&manifest, &dir_name).map_err(|message| LoadError::ManifestInvalid {
        dir: dir_name,
        message,
    })?;

    Ok(manifest)
}

/// List plugin directories under `root`, sorted by name so registration
/// order is stable across platforms and refreshes. Hidden directories and
/// plain files are skipped.
pub(crate) fn discover_plugin_dirs(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("failed to read plugins dir {}: {e}", root.display());
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect();

    dirs.sort();
    dirs
}

// ---------------------------------------------------------------------------
// Path safety
// ---------------------------------------------------------------------------

/// Returns true if a relative path attempts to escape its root via `..`,
/// absolute components, or other shenanigans.
pub(crate) fn is_path_escape(relative: &str) -> bool {
    let path = Path::new(relative);

    if path.is_absolute() {
        return true;
    }

    for component in path.components() {
        match component {
            Component::ParentDir => return true,
            Component::RootDir | Component::Prefix(_) => return true,
            _ => {}
        }
    }

    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
