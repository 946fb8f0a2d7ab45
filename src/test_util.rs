//! Shared fixtures for the test suites: stub capability backends and
//! plugin-directory builders.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::diagnostics::Diagnostics;
use crate::error::HostError;
use crate::host_api::HostEnv;
use crate::host_credentials::CredentialStore;
use crate::host_http::{HttpFetch, HttpRequestSpec, HttpResponseData};
use crate::manifest::PluginManifest;
use crate::registry::LoadedPlugin;
use crate::runtime;

/// Route `tracing` output through the test harness so `RUST_LOG` works in
/// test runs. Only the first call installs the subscriber.
pub(crate) fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Canned HTTP transport that records every request it sees.
pub(crate) struct StubHttp {
    response: Result<HttpResponseData, HostError>,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequestSpec>>,
}

impl StubHttp {
    pub(crate) fn ok(status: u16, body: &str) -> Self {
        Self {
            response: Ok(HttpResponseData {
                status,
                body_text: body.to_string(),
            }),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn err(error: HostError) -> Self {
        Self {
            response: Err(error),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<HttpRequestSpec> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl HttpFetch for StubHttp {
    async fn fetch(&self, request: HttpRequestSpec) -> Result<HttpResponseData, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        self.response.clone()
    }
}

/// Credential store stub: one optional secret for every service name.
pub(crate) struct StubCredentials(pub(crate) Option<String>);

impl CredentialStore for StubCredentials {
    fn read_generic_password(&self, _service_name: &str) -> Option<String> {
        self.0.clone()
    }
}

/// Host env over owned stubs, for tests that don't inspect the transport.
pub(crate) fn test_env_with(http: StubHttp, credentials: StubCredentials) -> Arc<HostEnv> {
    test_env_shared(Arc::new(http), credentials)
}

/// Host env over a shared transport stub, so the test can assert on call
/// counts and captured requests afterwards.
pub(crate) fn test_env_shared(http: Arc<StubHttp>, credentials: StubCredentials) -> Arc<HostEnv> {
    Arc::new(HostEnv {
        http,
        credentials: Arc::new(credentials),
        diagnostics: Arc::new(Diagnostics::new()),
    })
}

/// Compile a script straight into a `LoadedPlugin`, bypassing the disk.
pub(crate) fn load_test_plugin(id: &str, script: &str) -> LoadedPlugin {
    LoadedPlugin {
        manifest: PluginManifest {
            id: id.to_string(),
            main: "plugin.rhai".to_string(),
            name: None,
            description: None,
        },
        ast: runtime::compile(script).expect("test plugin script should compile"),
    }
}

/// Materialize a plugin directory under `root`: `{root}/{id}/manifest.json`
/// plus the entry script.
pub(crate) fn write_plugin(root: &Path, id: &str, script: &str) {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).expect("create plugin dir");
    std::fs::write(
        dir.join("manifest.json"),
        format!(r#"{{ "id": "{id}" }}"#),
    )
    .expect("write manifest");
    std::fs::write(dir.join("plugin.rhai"), script).expect("write entry script");
}
