//! Filesystem capability backend.
//!
//! Read-only. Paths may use the `~` home shorthand, which is expanded
//! exactly once here at the capability boundary — a plugin can never smuggle
//! a second expansion or an escape through later processing. After
//! expansion, every path must canonicalize to somewhere inside the
//! configured home root.

use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::error::HostError;

/// Expand the `~` / `~/...` shorthand against the configured home root.
/// Any other path is returned untouched.
fn expand_home(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        home.to_path_buf()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}

/// Resolve a plugin-supplied path: expand, require absolute, canonicalize
/// (which also resolves symlinks and `..`), and verify the result is still
/// inside the home root.
fn resolve_within_home(raw: &str, config: &EngineConfig) -> Result<PathBuf, HostError> {
    if raw.is_empty() {
        return Err(HostError::InvalidPath("path is empty".into()));
    }

    let expanded = expand_home(raw, &config.home_dir);
    if !expanded.is_absolute() {
        return Err(HostError::InvalidPath("path must be absolute".into()));
    }

    let canonical = expanded
        .canonicalize()
        .map_err(|e| HostError::Io(format!("failed to resolve {}: {e}", expanded.display())))?;

    // Canonicalize the root too so symlinked home dirs compare correctly.
    let home = config
        .home_dir
        .canonicalize()
        .unwrap_or_else(|_| config.home_dir.clone());

    if !canonical.starts_with(&home) {
        return Err(HostError::PathOutsideHome);
    }

    Ok(canonical)
}

/// Whether a readable entry exists at the path. Unresolvable or
/// out-of-bounds paths report false rather than erroring, so plugins can
/// use this as a cheap pre-check.
pub(crate) fn exists(raw: &str, config: &EngineConfig) -> bool {
    resolve_within_home(raw, config).is_ok()
}

/// Read a file as UTF-8 text, enforcing the configured size cap.
pub(crate) fn read_text(raw: &str, config: &EngineConfig) -> Result<String, HostError> {
    let path = resolve_within_home(raw, config)?;

    let metadata = std::fs::metadata(&path)
        .map_err(|e| HostError::Io(format!("failed to stat {}: {e}", path.display())))?;

    if !metadata.is_file() {
        return Err(HostError::InvalidPath("path is not a file".into()));
    }

    if metadata.len() > config.max_read_bytes {
        return Err(HostError::FileTooLarge {
            size: metadata.len(),
            limit: config.max_read_bytes,
        });
    }

    std::fs::read_to_string(&path)
        .map_err(|e| HostError::Io(format!("failed to read {}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
