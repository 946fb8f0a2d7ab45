//! Host-level configuration for the probe runtime.
//!
//! Everything a deployment might reasonably tune lives here with a serde
//! default, so a partial JSON config deserializes into a fully usable
//! `EngineConfig`. Tests override `home_dir` / `plugins_dir` to point at
//! fixtures instead of the real machine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default wall-clock budget for one probe invocation (30 seconds).
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 30_000;

/// Default per-request HTTP timeout when the plugin does not ask for one.
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Hard ceiling on any single HTTP request's timeout. Kept strictly below
/// the probe budget so a probe stuck in its one allowed capability call
/// still unblocks before the host gives up on the worker entirely.
const DEFAULT_HTTP_TIMEOUT_CEILING_MS: u64 = 15_000;

/// Maximum file size readable through the fs capability (10 MB).
const DEFAULT_MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum HTTP response body size (10 MB).
const DEFAULT_MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Tunables for the plugin engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root that `~` expands to and that all fs capability reads must stay
    /// inside.
    pub home_dir: PathBuf,

    /// Application data directory; installed plugins live in
    /// `{data_dir}/plugins`.
    pub data_dir: PathBuf,

    /// Directory holding bundled plugin resources, copied into the install
    /// directory on first run. `None` skips seeding.
    pub resource_dir: Option<PathBuf>,

    /// Explicit plugins directory. When set, development/install directory
    /// resolution is bypassed entirely.
    pub plugins_dir: Option<PathBuf>,

    pub probe_timeout_ms: u64,
    pub http_default_timeout_ms: u64,
    pub http_timeout_ceiling_ms: u64,
    pub max_read_bytes: u64,
    pub max_response_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            data_dir: default_data_dir(),
            resource_dir: None,
            plugins_dir: None,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            http_default_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            http_timeout_ceiling_ms: DEFAULT_HTTP_TIMEOUT_CEILING_MS,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

fn default_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Platform data dir (`~/Library/Application Support/openusage/`,
/// `~/.local/share/openusage/`, `%APPDATA%/openusage/`), falling back to
/// `~/.openusage/` when the platform dir is unavailable.
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("openusage"))
        .unwrap_or_else(|| default_home_dir().join(".openusage"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_http_ceiling_below_probe_budget() {
        let config = EngineConfig::default();
        assert!(config.http_timeout_ceiling_ms < config.probe_timeout_ms);
        assert!(config.http_default_timeout_ms <= config.http_timeout_ceiling_ms);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "probe_timeout_ms": 5000 }"#).unwrap();
        assert_eq!(config.probe_timeout_ms, 5000);
        assert_eq!(config.http_default_timeout_ms, DEFAULT_HTTP_TIMEOUT_MS);
        assert_eq!(config.max_read_bytes, DEFAULT_MAX_READ_BYTES);
        assert!(config.plugins_dir.is_none());
    }
}
