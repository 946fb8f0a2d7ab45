//! Script engine construction and result normalization.
//!
//! Each probe invocation gets a freshly built engine: its own resource
//! limits, its own termination token, its own deadline. Scripts get the
//! capability shim plus one pure utility, `parse_json` — nothing else.
//!
//! Normalization turns whatever dynamic value a plugin returned into the
//! fixed display schema, tolerating the int/float looseness that comes
//! with script-produced numbers and rejecting everything that does not fit
//! the contract.

use rhai::{AST, Dynamic, Engine, EvalAltResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::schema::{Line, ProbeResult};

const MAX_CALL_LEVELS: usize = 64;
const MAX_OPERATIONS: u64 = 10_000_000;
const MAX_STRING_SIZE: usize = 16 * 1024 * 1024;
const MAX_ARRAY_SIZE: usize = 64 * 1024;
const MAX_MAP_SIZE: usize = 64 * 1024;

/// How often (in operations) the progress callback re-checks the deadline.
/// The termination flag is checked on every callback regardless.
const DEADLINE_CHECK_MASK: u64 = 0x3FF;

/// Engine used only to compile plugin sources at load time. Host functions
/// resolve at call time in rhai, so compilation does not need them.
pub(crate) fn compile(code: &str) -> Result<AST, String> {
    let mut engine = Engine::new();
    // Pin parse-time expression-depth limits to rhai's standard (release)
    // defaults so compilation is independent of the build profile; debug
    // builds otherwise impose tighter defaults (16 within function bodies)
    // that would reject otherwise-valid bundled scripts.
    engine.set_max_expr_depths(64, 32);
    engine.compile(code).map_err(|e| e.to_string())
}

/// Whether a compiled script defines `probe` with exactly one parameter.
pub(crate) fn defines_probe(ast: &AST) -> bool {
    ast.iter_functions()
        .any(|f| f.name == "probe" && f.params.len() == 1)
}

/// Build the sandboxed engine for one probe invocation.
///
/// `terminate` is the executor's kill switch; `deadline` lets a runaway
/// compute loop halt itself even if nobody is waiting anymore.
pub(crate) fn probe_engine(terminate: Arc<AtomicBool>, deadline: Instant) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_call_levels(MAX_CALL_LEVELS);
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_string_size(MAX_STRING_SIZE);
    engine.set_max_array_size(MAX_ARRAY_SIZE);
    engine.set_max_map_size(MAX_MAP_SIZE);

    engine.on_progress(move |ops| {
        if terminate.load(Ordering::Relaxed) {
            return Some(Dynamic::from("abandoned"));
        }
        if ops & DEADLINE_CHECK_MASK == 0 && Instant::now() >= deadline {
            return Some(Dynamic::from("deadline"));
        }
        None
    });

    engine.register_fn(
        "parse_json",
        |text: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            let value: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| -> Box<EvalAltResult> { format!("invalid JSON: {e}").into() })?;
            rhai::serde::to_dynamic(value)
        },
    );

    crate::host_api::register_host_api(&mut engine);
    engine
}

// ---------------------------------------------------------------------------
// Result normalization
// ---------------------------------------------------------------------------

/// Convert a probe's return value into the display schema.
pub(crate) fn probe_result_from_dynamic(value: Dynamic) -> Result<ProbeResult, String> {
    let map = value
        .try_cast::<rhai::Map>()
        .ok_or_else(|| "probe must return a map".to_string())?;

    let lines_value = map
        .get("lines")
        .cloned()
        .ok_or_else(|| "probe result is missing \"lines\"".to_string())?;

    let array = lines_value
        .try_cast::<rhai::Array>()
        .ok_or_else(|| "\"lines\" must be an array".to_string())?;

    let mut lines = Vec::with_capacity(array.len());
    for (index, item) in array.into_iter().enumerate() {
        lines.push(line_from_dynamic(item).map_err(|e| format!("line {index}: {e}"))?);
    }

    Ok(ProbeResult { lines })
}

fn line_from_dynamic(item: Dynamic) -> Result<Line, String> {
    let map = item
        .try_cast::<rhai::Map>()
        .ok_or_else(|| "line must be a map".to_string())?;

    let kind = required_string(&map, "type")?;
    let label = required_string(&map, "label")?;
    let color = optional_string(&map, "color")?;

    match kind.as_str() {
        "text" => Ok(Line::Text {
            label,
            value: required_string(&map, "value")?,
            color,
        }),
        "progress" => Ok(Line::Progress {
            label,
            value: required_number(&map, "value")?,
            max: required_number(&map, "max")?,
            unit: optional_string(&map, "unit")?,
            color,
        }),
        "badge" => Ok(Line::Badge {
            label,
            text: required_string(&map, "text")?,
            color,
        }),
        other => Err(format!("unknown line type \"{other}\"")),
    }
}

fn required_string(map: &rhai::Map, key: &str) -> Result<String, String> {
    match map.get(key) {
        Some(value) => value
            .clone()
            .into_string()
            .map_err(|t| format!("\"{key}\" must be a string, not {t}")),
        None => Err(format!("missing \"{key}\"")),
    }
}

/// Absent and `()` both mean "not set"; anything else must be a string.
fn optional_string(map: &rhai::Map, key: &str) -> Result<Option<String>, String> {
    match map.get(key) {
        None => Ok(None),
        Some(value) if value.is_unit() => Ok(None),
        Some(value) => value
            .clone()
            .into_string()
            .map(Some)
            .map_err(|t| format!("\"{key}\" must be a string, not {t}")),
    }
}

fn required_number(map: &rhai::Map, key: &str) -> Result<f64, String> {
    let value = map.get(key).ok_or_else(|| format!("missing \"{key}\""))?;
    if let Ok(int) = value.as_int() {
        return Ok(int as f64);
    }
    value
        .as_float()
        .map_err(|t| format!("\"{key}\" must be a number, not {t}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
