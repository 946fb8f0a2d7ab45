//! One probe invocation under isolation, timeout, and fault containment.
//!
//! The executor is the last-resort safety net: plugins are expected to map
//! their own expected failures (missing credentials, HTTP errors, bad JSON)
//! to status lines, and only genuinely unexpected faults reach this
//! boundary. Whatever happens inside the script — a throw, a type error, a
//! panic in the worker, a hang — the executor hands back a `ProbeResult`,
//! never an error.
//!
//! Timeout semantics: the script's engine carries a deadline, so runaway
//! compute halts itself at the next instruction boundary. Independently,
//! the executor races the worker against the same budget (plus a small
//! grace for scripts stuck inside a capability call, which unblock when
//! that call's own clamped timeout fires). When the race is lost the
//! invocation is abandoned: its termination token is raised, its late
//! result is discarded, and its shim drops any further diagnostics writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::host_api::{HostEnv, ProbeContext, ShimState};
use crate::registry::LoadedPlugin;
use crate::runtime;
use crate::schema::ProbeResult;

/// Extra wall-clock allowance past the probe budget before the executor
/// stops waiting for the worker.
const ABANDON_GRACE: Duration = Duration::from_millis(500);

enum ProbeFault {
    /// Script was halted by the termination token or deadline.
    Terminated,
    /// Script threw, misused the shim, or returned an invalid shape.
    Fault(String),
}

/// Run one plugin's `probe` and normalize every outcome to a `ProbeResult`.
pub(crate) async fn execute(
    plugin: Arc<LoadedPlugin>,
    env: Arc<HostEnv>,
    config: Arc<EngineConfig>,
) -> ProbeResult {
    let plugin_id = plugin.manifest.id.clone();
    let budget = Duration::from_millis(config.probe_timeout_ms);
    let deadline = Instant::now() + budget;

    let abandoned = Arc::new(AtomicBool::new(false));
    let terminate = Arc::new(AtomicBool::new(false));

    let state = Arc::new(ShimState {
        plugin_id: plugin_id.clone(),
        config: config.clone(),
        env: env.clone(),
        handle: tokio::runtime::Handle::current(),
        abandoned: abandoned.clone(),
    });
    let ctx = ProbeContext::new(state);

    let terminate_for_worker = terminate.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let engine = runtime::probe_engine(terminate_for_worker, deadline);
        run_probe(&engine, &plugin, ctx)
    });

    match tokio::time::timeout(budget + ABANDON_GRACE, worker).await {
        Ok(Ok(Ok(result))) => result,
        Ok(Ok(Err(ProbeFault::Terminated))) => {
            env.diagnostics
                .error(&plugin_id, "probe exceeded its time budget");
            ProbeResult::error_badge("timeout")
        }
        Ok(Ok(Err(ProbeFault::Fault(message)))) => {
            env.diagnostics
                .error(&plugin_id, &format!("probe failed: {message}"));
            ProbeResult::error_badge("probe failed")
        }
        Ok(Err(join_error)) => {
            // Worker panicked; the panic stays contained here.
            env.diagnostics
                .error(&plugin_id, &format!("probe worker crashed: {join_error}"));
            ProbeResult::error_badge("probe failed")
        }
        Err(_elapsed) => {
            // Abandon first so the straggler can no longer write host state,
            // then tell its engine to halt at the next instruction boundary.
            abandoned.store(true, Ordering::Relaxed);
            terminate.store(true, Ordering::Relaxed);
            env.diagnostics.error(
                &plugin_id,
                "probe did not return within its time budget; abandoned",
            );
            ProbeResult::error_badge("timeout")
        }
    }
}

fn run_probe(
    engine: &rhai::Engine,
    plugin: &LoadedPlugin,
    ctx: ProbeContext,
) -> Result<ProbeResult, ProbeFault> {
    let mut scope = rhai::Scope::new();
    let outcome = engine.call_fn::<rhai::Dynamic>(&mut scope, &plugin.ast, "probe", (ctx,));

    match outcome {
        Ok(value) => runtime::probe_result_from_dynamic(value)
            .map_err(|e| ProbeFault::Fault(format!("invalid probe result: {e}"))),
        Err(error) => match *error {
            rhai::EvalAltResult::ErrorTerminated(..) => Err(ProbeFault::Terminated),
            other => Err(ProbeFault::Fault(other.to_string())),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
