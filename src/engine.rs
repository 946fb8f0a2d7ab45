//! The plugin engine: startup initialization and the command boundary.
//!
//! `PluginEngine::initialize` resolves where plugins live (a development
//! `plugins/` directory next to the working directory wins; otherwise the
//! install directory under the app data dir, seeded from bundled resources
//! on first run), loads the registry once, and wires the real capability
//! backends. After that, `run_plugin_probes` is the only operation: probe
//! everything, return one report per provider. It never fails — a broken
//! provider is a degraded report, not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::aggregator;
use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::host_api::HostEnv;
use crate::host_credentials::SystemKeychain;
use crate::host_http::ReqwestFetcher;
use crate::registry::PluginRegistry;
use crate::schema::ProviderReport;

pub struct PluginEngine {
    config: Arc<EngineConfig>,
    env: Arc<HostEnv>,
    registry: PluginRegistry,
}

impl PluginEngine {
    /// Build the engine with the real capability backends and load the
    /// registry. Load failures are diagnostics, never panics or errors.
    pub fn initialize(config: EngineConfig) -> Self {
        let env = Arc::new(HostEnv {
            http: Arc::new(ReqwestFetcher::new(&config)),
            credentials: Arc::new(SystemKeychain),
            diagnostics: Arc::new(Diagnostics::new()),
        });
        Self::with_backends(config, env)
    }

    /// Same initialization with injected capability backends. This is the
    /// seam the test suites use; the presentation layer has no reason to.
    pub fn with_backends(config: EngineConfig, env: Arc<HostEnv>) -> Self {
        let plugins_dir = resolve_plugins_dir(&config);
        tracing::debug!("loading plugins from {}", plugins_dir.display());
        let registry = PluginRegistry::load_from_dir(&plugins_dir, &env.diagnostics);
        Self {
            config: Arc::new(config),
            env,
            registry,
        }
    }

    /// The command boundary: probe every registered plugin and return one
    /// report per provider, in registration order. Idempotent; repeated
    /// calls simply re-run the full pass.
    pub async fn run_plugin_probes(&self) -> Vec<ProviderReport> {
        aggregator::run_all(&self.registry, &self.env, &self.config).await
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.env.diagnostics
    }
}

// ---------------------------------------------------------------------------
// Plugins directory resolution
// ---------------------------------------------------------------------------

fn resolve_plugins_dir(config: &EngineConfig) -> PathBuf {
    if let Some(dir) = &config.plugins_dir {
        return dir.clone();
    }

    if let Some(dev_dir) = find_dev_plugins_dir()
        && !is_dir_empty(&dev_dir)
    {
        return dev_dir;
    }

    let install_dir = config.data_dir.join("plugins");
    if let Err(e) = std::fs::create_dir_all(&install_dir) {
        tracing::warn!("failed to create install dir {}: {e}", install_dir.display());
    }

    if is_dir_empty(&install_dir)
        && let Some(resource_dir) = &config.resource_dir
    {
        let bundled_dir = resolve_bundled_dir(resource_dir);
        if bundled_dir.exists() {
            copy_dir_recursive(&bundled_dir, &install_dir);
        }
    }

    install_dir
}

/// A `plugins/` directory in (or next to) the working directory takes
/// precedence during development.
fn find_dev_plugins_dir() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let direct = cwd.join("plugins");
    if direct.exists() {
        return Some(direct);
    }
    let parent = cwd.join("..").join("plugins");
    if parent.exists() {
        return Some(parent);
    }
    None
}

/// Bundled plugins may sit under a nested `resources/` directory depending
/// on how the bundler laid the resource dir out.
fn resolve_bundled_dir(resource_dir: &Path) -> PathBuf {
    let nested = resource_dir.join("resources/bundled_plugins");
    if nested.exists() {
        nested
    } else {
        resource_dir.join("bundled_plugins")
    }
}

fn is_dir_empty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(e) => {
            tracing::warn!("failed to read dir {}: {e}", path.display());
            true
        }
    }
}

/// Best-effort recursive copy used to seed the install directory. Symlinks
/// are skipped; individual failures are logged and do not stop the rest.
fn copy_dir_recursive(src: &Path, dst: &Path) {
    let entries = match std::fs::read_dir(src) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("failed to read dir {}: {e}", src.display());
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("failed to read entry in {}: {e}", src.display());
                continue;
            }
        };
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                tracing::warn!("failed to read file type for {}: {e}", src_path.display());
                continue;
            }
        };
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            if let Err(e) = std::fs::create_dir_all(&dst_path) {
                tracing::warn!("failed to create dir {}: {e}", dst_path.display());
                continue;
            }
            copy_dir_recursive(&src_path, &dst_path);
        } else if file_type.is_file()
            && let Err(e) = std::fs::copy(&src_path, &dst_path)
        {
            tracing::warn!(
                "failed to copy {} to {}: {e}",
                src_path.display(),
                dst_path.display()
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
