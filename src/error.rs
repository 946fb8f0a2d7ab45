//! Error taxonomy for the probe runtime.
//!
//! `LoadError` covers structural problems discovered while loading a plugin;
//! it is never fatal — the offending plugin is skipped and the error is
//! reported to diagnostics once. `HostError` covers capability-call failures;
//! it is raised into the running script as a catchable error so the plugin
//! can map it to a meaningful status line itself.

use thiserror::Error;

/// A plugin directory could not be turned into a registered plugin.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{dir}: failed to read manifest.json: {message}")]
    ManifestRead { dir: String, message: String },

    #[error("{dir}: invalid manifest.json: {message}")]
    ManifestInvalid { dir: String, message: String },

    #[error("plugin \"{id}\": failed to read entry script: {message}")]
    ScriptRead { id: String, message: String },

    #[error("plugin \"{id}\": script failed to compile: {message}")]
    ScriptCompile { id: String, message: String },

    #[error("plugin \"{id}\": script does not define a probe function taking one argument")]
    MissingProbe { id: String },

    #[error("plugin \"{id}\": duplicate id, already registered")]
    DuplicateId { id: String },
}

/// A capability call failed. String payloads keep the variants cheap to
/// clone into script errors and test fixtures.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path is outside the home directory")]
    PathOutsideHome,

    #[error("file exceeds maximum size ({size} bytes > {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("response body exceeds maximum size ({size} bytes > {limit} bytes)")]
    BodyTooLarge { size: usize, limit: usize },
}
