//! Concurrent fan-out over the registry.
//!
//! Every registered plugin is probed on each pass, each with its own fresh
//! capability shim; results come back in registration order no matter which
//! probe finishes last. Per-plugin isolation lives in the executor, so one
//! hung or broken provider costs its own slot a timeout badge and nothing
//! else.

use futures_util::future::join_all;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::executor;
use crate::host_api::HostEnv;
use crate::registry::PluginRegistry;
use crate::schema::ProviderReport;

/// Probe every registered plugin concurrently. Exactly one report per
/// plugin, in registration order.
pub(crate) async fn run_all(
    registry: &PluginRegistry,
    env: &Arc<HostEnv>,
    config: &Arc<EngineConfig>,
) -> Vec<ProviderReport> {
    let probes = registry.plugins().iter().map(|plugin| {
        let plugin = plugin.clone();
        let env = env.clone();
        let config = config.clone();
        async move {
            let id = plugin.manifest.id.clone();
            let result = executor::execute(plugin, env, config).await;
            ProviderReport {
                id,
                lines: result.lines,
            }
        }
    });

    // join_all preserves input order, which is registration order.
    join_all(probes).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Line, ProbeResult};
    use crate::test_util::{load_test_plugin, test_env_with, StubCredentials, StubHttp};
    use std::time::{Duration, Instant};

    fn registry_of(plugins: Vec<(&str, &str)>) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        for (id, script) in plugins {
            registry
                .register(load_test_plugin(id, script))
                .expect("test plugin should register");
        }
        registry
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_report_per_plugin_in_registration_order() {
        let ok = r#"fn probe(ctx) { #{ lines: [#{ type: "badge", label: "Status", text: "ok" }] } }"#;
        let registry = registry_of(vec![("zulu", ok), ("alpha", ok), ("mike", ok)]);

        let env = test_env_with(StubHttp::ok(200, "{}"), StubCredentials(None));
        let config = Arc::new(EngineConfig::default());
        let reports = run_all(&registry, &env, &config).await;

        let ids: Vec<_> = reports.iter().map(|r| r.id.as_str()).collect();
        // Registration order, not alphabetical and not completion order.
        assert_eq!(ids, vec!["zulu", "alpha", "mike"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_and_hanging_plugins_do_not_displace_the_rest() {
        let registry = registry_of(vec![
            (
                "healthy",
                r#"fn probe(ctx) { #{ lines: [#{ type: "text", label: "Plan", value: "Pro" }] } }"#,
            ),
            ("broken", r#"fn probe(ctx) { throw "bad day"; }"#),
            ("stuck", r#"fn probe(ctx) { loop { } }"#),
        ]);

        let env = test_env_with(StubHttp::ok(200, "{}"), StubCredentials(None));
        let config = Arc::new(EngineConfig {
            probe_timeout_ms: 400,
            ..EngineConfig::default()
        });

        let started = Instant::now();
        let reports = run_all(&registry, &env, &config).await;
        let elapsed = started.elapsed();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].id, "healthy");
        assert_eq!(
            reports[0].lines,
            vec![Line::Text {
                label: "Plan".into(),
                value: "Pro".into(),
                color: None
            }]
        );
        assert_eq!(reports[1].lines, ProbeResult::error_badge("probe failed").lines);
        assert_eq!(reports[2].lines, ProbeResult::error_badge("timeout").lines);

        // The pass is bounded by one budget, not one budget per hung plugin.
        assert!(
            elapsed < Duration::from_secs(5),
            "aggregation took {elapsed:?}"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn many_hung_plugins_still_finish_within_one_budget() {
        let hang = r#"fn probe(ctx) { loop { } }"#;
        let registry = registry_of(vec![("h1", hang), ("h2", hang), ("h3", hang)]);

        let env = test_env_with(StubHttp::ok(200, "{}"), StubCredentials(None));
        let config = Arc::new(EngineConfig {
            probe_timeout_ms: 400,
            ..EngineConfig::default()
        });

        let started = Instant::now();
        let reports = run_all(&registry, &env, &config).await;

        assert_eq!(reports.len(), 3);
        for report in &reports {
            assert_eq!(report.lines, ProbeResult::error_badge("timeout").lines);
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_registry_yields_empty_report() {
        let registry = PluginRegistry::new();
        let env = test_env_with(StubHttp::ok(200, "{}"), StubCredentials(None));
        let config = Arc::new(EngineConfig::default());
        assert!(run_all(&registry, &env, &config).await.is_empty());
    }
}
