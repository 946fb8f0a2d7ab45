//! Outbound HTTP capability backend.
//!
//! Plugins see a single `request` operation with an explicit per-request
//! timeout. The backend enforces that timeout itself (clamped to the host
//! ceiling), allows only http/https URLs, follows a bounded number of
//! redirects, and caps response body size. The transport is injected as a
//! trait object so tests can stub it and count calls.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::HostError;

/// One request as specified by a plugin, after host-side normalization.
#[derive(Debug, Clone)]
pub struct HttpRequestSpec {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub body: Option<String>,
}

/// What a plugin gets back: status plus the body as text.
#[derive(Debug, Clone)]
pub struct HttpResponseData {
    pub status: u16,
    pub body_text: String,
}

/// Outbound HTTP transport, injected into the capability shim.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, request: HttpRequestSpec) -> Result<HttpResponseData, HostError>;
}

/// Validate that a URL is safe to fetch: parseable, http or https only.
pub(crate) fn validate_url(raw: &str) -> Result<(), HostError> {
    let parsed = url::Url::parse(raw).map_err(|e| HostError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(HostError::InvalidUrl(format!(
            "scheme \"{scheme}\" is not allowed; use http or https"
        ))),
    }
}

/// Clamp a plugin-requested timeout to the host ceiling. Zero (or absent
/// upstream) means "use the host default".
pub(crate) fn effective_timeout(requested_ms: Option<u64>, config: &EngineConfig) -> Duration {
    let ms = match requested_ms {
        Some(ms) if ms > 0 => ms.min(config.http_timeout_ceiling_ms),
        _ => config.http_default_timeout_ms,
    };
    Duration::from_millis(ms)
}

// ---------------------------------------------------------------------------
// reqwest backend
// ---------------------------------------------------------------------------

/// Production transport backed by reqwest.
pub struct ReqwestFetcher {
    max_response_bytes: usize,
}

impl ReqwestFetcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_response_bytes: config.max_response_bytes,
        }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch(&self, request: HttpRequestSpec) -> Result<HttpResponseData, HostError> {
        validate_url(&request.url)?;

        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| HostError::InvalidRequest(format!("invalid method: {}", request.method)))?;

        let client = reqwest::Client::builder()
            .timeout(request.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| HostError::Transport(format!("failed to create HTTP client: {e}")))?;

        let mut builder = client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HostError::Timeout
            } else {
                HostError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        let body_bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                HostError::Timeout
            } else {
                HostError::Transport(format!("failed to read response body: {e}"))
            }
        })?;

        if body_bytes.len() > self.max_response_bytes {
            return Err(HostError::BodyTooLarge {
                size: body_bytes.len(),
                limit: self.max_response_bytes,
            });
        }

        Ok(HttpResponseData {
            status,
            body_text: String::from_utf8_lossy(&body_bytes).to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(url: &str) -> HttpRequestSpec {
        HttpRequestSpec {
            method: "GET".into(),
            url: url.into(),
            headers: Vec::new(),
            timeout: Duration::from_secs(5),
            body: None,
        }
    }

    // -- URL validation --

    #[test]
    fn validate_allows_http_and_https() {
        assert!(validate_url("https://api.example.com/data").is_ok());
        assert!(validate_url("http://localhost:8080/api").is_ok());
    }

    #[test]
    fn validate_blocks_other_schemes() {
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("ftp://example.com/file").is_err());
        assert!(validate_url("data:text/plain,hello").is_err());
    }

    #[test]
    fn validate_rejects_garbage() {
        assert!(matches!(
            validate_url("not a url"),
            Err(HostError::InvalidUrl(_))
        ));
    }

    // -- Timeout clamping --

    #[test]
    fn timeout_defaults_and_clamps() {
        let config = EngineConfig::default();
        assert_eq!(
            effective_timeout(None, &config),
            Duration::from_millis(config.http_default_timeout_ms)
        );
        assert_eq!(
            effective_timeout(Some(0), &config),
            Duration::from_millis(config.http_default_timeout_ms)
        );
        assert_eq!(
            effective_timeout(Some(2_000), &config),
            Duration::from_millis(2_000)
        );
        assert_eq!(
            effective_timeout(Some(10 * 60 * 1000), &config),
            Duration::from_millis(config.http_timeout_ceiling_ms)
        );
    }

    // -- reqwest backend against a local mock server --

    #[tokio::test]
    async fn fetch_passes_through_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/usage")
            .with_status(200)
            .with_body(r#"{"five_hour":{"utilization":42}}"#)
            .create_async()
            .await;

        let fetcher = ReqwestFetcher::new(&EngineConfig::default());
        let response = fetcher.fetch(spec(&format!("{}/usage", server.url()))).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.body_text.contains("utilization"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_reports_non_2xx_status_not_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/usage")
            .with_status(401)
            .with_body("denied")
            .create_async()
            .await;

        let fetcher = ReqwestFetcher::new(&EngineConfig::default());
        let response = fetcher.fetch(spec(&format!("{}/usage", server.url()))).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.body_text, "denied");
    }

    #[tokio::test]
    async fn fetch_sends_request_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/usage")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let mut request = spec(&format!("{}/usage", server.url()));
        request
            .headers
            .push(("Authorization".into(), "Bearer sk-test".into()));

        let fetcher = ReqwestFetcher::new(&EngineConfig::default());
        fetcher.fetch(request).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big")
            .with_status(200)
            .with_body("x".repeat(256))
            .create_async()
            .await;

        let config = EngineConfig {
            max_response_bytes: 64,
            ..EngineConfig::default()
        };
        let fetcher = ReqwestFetcher::new(&config);
        let result = fetcher.fetch(spec(&format!("{}/big", server.url()))).await;

        assert!(matches!(result, Err(HostError::BodyTooLarge { .. })));
    }

    #[tokio::test]
    async fn bad_scheme_never_reaches_the_network() {
        let fetcher = ReqwestFetcher::new(&EngineConfig::default());
        let result = fetcher.fetch(spec("file:///etc/passwd")).await;
        assert!(matches!(result, Err(HostError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let fetcher = ReqwestFetcher::new(&EngineConfig::default());
        // Port 1 is essentially never listening.
        let result = fetcher.fetch(spec("http://127.0.0.1:1/")).await;
        assert!(matches!(result, Err(HostError::Transport(_))));
    }
}
