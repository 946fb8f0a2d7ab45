//! The capability shim handed to plugin code.
//!
//! A probe's `ctx` parameter is a `ProbeContext`: four narrow sub-APIs
//! (`fs`, `keychain`, `http`, `log`) and nothing else. The shim is built
//! fresh for every invocation (capability injection, not ambient authority)
//! and carries the invocation's abandoned flag, so a timed-out probe loses
//! its ability to write host diagnostics the moment the executor gives up
//! on it.
//!
//! Script-facing surface:
//!
//! ```rhai
//! ctx.fs.exists(path)                       // -> bool
//! ctx.fs.read_text(path)                    // -> string, throws on failure
//! ctx.keychain.read_generic_password(name)  // -> string, or () when absent
//! ctx.http.request(#{ method, url, headers, timeout_ms, body })
//!                                           // -> #{ status, body_text }, throws
//! ctx.log.warn(message)                     // never throws
//! ctx.log.error(message)
//! ```

use rhai::{Dynamic, Engine, EvalAltResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::host_credentials::CredentialStore;
use crate::host_fs;
use crate::host_http::{self, HttpFetch, HttpRequestSpec};

/// Capability backends shared by every probe invocation. The backends are
/// stateless (or internally synchronized); per-invocation state lives in
/// `ShimState`.
pub struct HostEnv {
    pub http: Arc<dyn HttpFetch>,
    pub credentials: Arc<dyn CredentialStore>,
    pub diagnostics: Arc<Diagnostics>,
}

/// Per-invocation shim state, shared by the sub-APIs of one `ProbeContext`.
pub(crate) struct ShimState {
    pub(crate) plugin_id: String,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) env: Arc<HostEnv>,
    /// Bridges the synchronous script world to async capability backends.
    pub(crate) handle: tokio::runtime::Handle,
    /// Set by the executor when it stops waiting for this invocation.
    pub(crate) abandoned: Arc<AtomicBool>,
}

/// The `ctx` object passed to `probe`.
#[derive(Clone)]
pub(crate) struct ProbeContext {
    state: Arc<ShimState>,
}

impl ProbeContext {
    pub(crate) fn new(state: Arc<ShimState>) -> Self {
        Self { state }
    }
}

#[derive(Clone)]
pub(crate) struct FsApi {
    state: Arc<ShimState>,
}

#[derive(Clone)]
pub(crate) struct KeychainApi {
    state: Arc<ShimState>,
}

#[derive(Clone)]
pub(crate) struct HttpApi {
    state: Arc<ShimState>,
}

#[derive(Clone)]
pub(crate) struct LogApi {
    state: Arc<ShimState>,
}

impl FsApi {
    fn exists(&mut self, path: &str) -> bool {
        host_fs::exists(path, &self.state.config)
    }

    fn read_text(&mut self, path: &str) -> Result<String, Box<EvalAltResult>> {
        host_fs::read_text(path, &self.state.config).map_err(|e| e.to_string().into())
    }
}

impl KeychainApi {
    fn read_generic_password(&mut self, service_name: &str) -> Dynamic {
        match self
            .state
            .env
            .credentials
            .read_generic_password(service_name)
        {
            Some(secret) => Dynamic::from(secret),
            None => Dynamic::UNIT,
        }
    }
}

impl HttpApi {
    fn request(&mut self, spec: rhai::Map) -> Result<rhai::Map, Box<EvalAltResult>> {
        let request = parse_request_spec(&spec, &self.state.config)?;
        let state = &self.state;

        let response = state
            .handle
            .block_on(state.env.http.fetch(request))
            .map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })?;

        let mut out = rhai::Map::new();
        out.insert("status".into(), Dynamic::from(response.status as i64));
        out.insert("body_text".into(), Dynamic::from(response.body_text));
        Ok(out)
    }
}

impl LogApi {
    fn warn(&mut self, message: &str) {
        self.write("warn", message);
    }

    fn error(&mut self, message: &str) {
        self.write("error", message);
    }

    fn write(&self, level: &str, message: &str) {
        // An abandoned probe must not touch host state anymore.
        if self.state.abandoned.load(Ordering::Relaxed) {
            tracing::trace!(
                plugin = %self.state.plugin_id,
                "dropping log write from abandoned probe"
            );
            return;
        }
        match level {
            "error" => self.state.env.diagnostics.error(&self.state.plugin_id, message),
            _ => self.state.env.diagnostics.warn(&self.state.plugin_id, message),
        };
    }
}

/// Normalize the request map a script passed to `ctx.http.request`.
fn parse_request_spec(
    spec: &rhai::Map,
    config: &EngineConfig,
) -> Result<HttpRequestSpec, Box<EvalAltResult>> {
    let url = get_string(spec, "url")
        .ok_or_else(|| -> Box<EvalAltResult> { "http.request requires a \"url\" string".into() })?;

    let method = get_string(spec, "method").unwrap_or_else(|| "GET".to_string());

    let mut headers = Vec::new();
    if let Some(value) = spec.get("headers") {
        let map = value.clone().try_cast::<rhai::Map>().ok_or_else(
            || -> Box<EvalAltResult> { "http.request \"headers\" must be a map".into() },
        )?;
        for (key, value) in map {
            let value = value.into_string().map_err(|t| -> Box<EvalAltResult> {
                format!("header \"{key}\" must be a string, not {t}").into()
            })?;
            headers.push((key.to_string(), value));
        }
    }

    let timeout_ms = spec
        .get("timeout_ms")
        .and_then(|v| v.as_int().ok())
        .and_then(|ms| u64::try_from(ms).ok());

    Ok(HttpRequestSpec {
        method,
        url,
        headers,
        timeout: host_http::effective_timeout(timeout_ms, config),
        body: get_string(spec, "body"),
    })
}

fn get_string(map: &rhai::Map, key: &str) -> Option<String> {
    map.get(key).and_then(|v| v.clone().into_string().ok())
}

/// Register the shim types on a probe engine. Only what is listed here is
/// reachable from plugin code.
pub(crate) fn register_host_api(engine: &mut Engine) {
    engine
        .register_type_with_name::<ProbeContext>("ProbeContext")
        .register_get("fs", |ctx: &mut ProbeContext| FsApi {
            state: ctx.state.clone(),
        })
        .register_get("keychain", |ctx: &mut ProbeContext| KeychainApi {
            state: ctx.state.clone(),
        })
        .register_get("http", |ctx: &mut ProbeContext| HttpApi {
            state: ctx.state.clone(),
        })
        .register_get("log", |ctx: &mut ProbeContext| LogApi {
            state: ctx.state.clone(),
        });

    engine
        .register_type_with_name::<FsApi>("FsApi")
        .register_fn("exists", FsApi::exists)
        .register_fn("read_text", FsApi::read_text);

    engine
        .register_type_with_name::<KeychainApi>("KeychainApi")
        .register_fn("read_generic_password", KeychainApi::read_generic_password);

    engine
        .register_type_with_name::<HttpApi>("HttpApi")
        .register_fn("request", HttpApi::request);

    engine
        .register_type_with_name::<LogApi>("LogApi")
        .register_fn("warn", LogApi::warn)
        .register_fn("error", LogApi::error);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{StubCredentials, StubHttp};

    fn shim_state(env: Arc<HostEnv>) -> Arc<ShimState> {
        Arc::new(ShimState {
            plugin_id: "test-plugin".into(),
            config: Arc::new(EngineConfig::default()),
            env,
            handle: tokio::runtime::Handle::current(),
            abandoned: Arc::new(AtomicBool::new(false)),
        })
    }

    fn test_env() -> Arc<HostEnv> {
        Arc::new(HostEnv {
            http: Arc::new(StubHttp::ok(200, "{}")),
            credentials: Arc::new(StubCredentials(None)),
            diagnostics: Arc::new(Diagnostics::new()),
        })
    }

    #[tokio::test]
    async fn log_writes_reach_diagnostics() {
        let env = test_env();
        let mut log = LogApi {
            state: shim_state(env.clone()),
        };
        log.warn("something odd");
        log.error("something bad");

        let entries = env.diagnostics.recent(0);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, "test-plugin");
        assert_eq!(entries[0].level, "warn");
        assert_eq!(entries[1].level, "error");
    }

    #[tokio::test]
    async fn abandoned_probe_log_writes_are_dropped() {
        let env = test_env();
        let state = shim_state(env.clone());
        state.abandoned.store(true, Ordering::Relaxed);

        let mut log = LogApi { state };
        log.warn("too late");
        log.error("way too late");

        assert!(env.diagnostics.recent(0).is_empty());
    }

    #[tokio::test]
    async fn keychain_absent_is_unit() {
        let env = test_env();
        let mut keychain = KeychainApi {
            state: shim_state(env),
        };
        assert!(keychain.read_generic_password("nope").is_unit());
    }

    #[tokio::test]
    async fn keychain_present_is_string() {
        let env = Arc::new(HostEnv {
            http: Arc::new(StubHttp::ok(200, "{}")),
            credentials: Arc::new(StubCredentials(Some("secret-json".into()))),
            diagnostics: Arc::new(Diagnostics::new()),
        });
        let mut keychain = KeychainApi {
            state: shim_state(env),
        };
        let value = keychain.read_generic_password("svc");
        assert_eq!(value.into_string().unwrap(), "secret-json");
    }

    #[test]
    fn request_spec_requires_url() {
        let config = EngineConfig::default();
        let spec = rhai::Map::new();
        assert!(parse_request_spec(&spec, &config).is_err());
    }

    #[test]
    fn request_spec_normalizes_fields() {
        let config = EngineConfig::default();
        let mut headers = rhai::Map::new();
        headers.insert("Accept".into(), Dynamic::from("application/json"));

        let mut spec = rhai::Map::new();
        spec.insert("url".into(), Dynamic::from("https://api.example.com/usage"));
        spec.insert("headers".into(), Dynamic::from(headers));
        spec.insert("timeout_ms".into(), Dynamic::from(2_000_i64));

        let request = parse_request_spec(&spec, &config).unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.url, "https://api.example.com/usage");
        assert_eq!(
            request.headers,
            vec![("Accept".to_string(), "application/json".to_string())]
        );
        assert_eq!(request.timeout, std::time::Duration::from_millis(2_000));
        assert!(request.body.is_none());
    }

    #[test]
    fn request_spec_clamps_huge_timeouts() {
        let config = EngineConfig::default();
        let mut spec = rhai::Map::new();
        spec.insert("url".into(), Dynamic::from("https://api.example.com/"));
        spec.insert("timeout_ms".into(), Dynamic::from(86_400_000_i64));

        let request = parse_request_spec(&spec, &config).unwrap();
        assert_eq!(
            request.timeout,
            std::time::Duration::from_millis(config.http_timeout_ceiling_ms)
        );
    }
}
