//! Display schema shared by every provider.
//!
//! A probe returns a `ProbeResult`: an ordered list of renderable lines.
//! The variant tag and field names are part of the wire contract with the
//! presentation layer, so they are locked down with serde attributes here
//! and nowhere else.

use serde::{Deserialize, Serialize};

/// Failure severity color used for host-synthesized error badges.
pub(crate) const COLOR_ERROR: &str = "#ef4444";

/// One renderable status/metric item.
///
/// `label` names the row; `color` is an opaque display hint that the host
/// passes through untouched. For `Progress`, `value >= 0` and `max > 0` are
/// the plugin's responsibility — consumers clamp for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Line {
    Text {
        label: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    Progress {
        label: String,
        value: f64,
        max: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    Badge {
        label: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
}

/// What a single probe invocation produced. Line order is display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub lines: Vec<Line>,
}

impl ProbeResult {
    /// Degraded result synthesized by the executor when a probe fails or
    /// times out: exactly one red `Error` badge.
    pub(crate) fn error_badge(text: &str) -> Self {
        Self {
            lines: vec![Line::Badge {
                label: "Error".to_string(),
                text: text.to_string(),
                color: Some(COLOR_ERROR.to_string()),
            }],
        }
    }
}

/// One aggregator output entry: a provider id plus its rendered lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReport {
    pub id: String,
    pub lines: Vec<Line>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_line_serializes_with_type_tag() {
        let line = Line::Text {
            label: "Plan".into(),
            value: "Max".into(),
            color: None,
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["label"], "Plan");
        assert_eq!(json["value"], "Max");
        assert!(json.get("color").is_none(), "absent color must be omitted");
    }

    #[test]
    fn progress_line_keeps_optional_fields_when_present() {
        let line = Line::Progress {
            label: "Session (5h)".into(),
            value: 42.0,
            max: 100.0,
            unit: Some("percent".into()),
            color: Some("#22c55e".into()),
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["unit"], "percent");
        assert_eq!(json["color"], "#22c55e");
    }

    #[test]
    fn report_roundtrip_preserves_order_tags_and_options() {
        let report = ProviderReport {
            id: "claude".into(),
            lines: vec![
                Line::Badge {
                    label: "Plan".into(),
                    text: "Max".into(),
                    color: Some("#000000".into()),
                },
                Line::Progress {
                    label: "Weekly (7d)".into(),
                    value: 17.5,
                    max: 100.0,
                    unit: Some("percent".into()),
                    color: None,
                },
                Line::Text {
                    label: "Extra usage".into(),
                    value: "$12.5".into(),
                    color: None,
                },
            ],
        };

        let json = serde_json::to_string(&report).unwrap();
        let restored: ProviderReport = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, report);
    }

    #[test]
    fn error_badge_is_a_single_red_error_line() {
        let result = ProbeResult::error_badge("timeout");
        assert_eq!(result.lines.len(), 1);
        match &result.lines[0] {
            Line::Badge { label, text, color } => {
                assert_eq!(label, "Error");
                assert_eq!(text, "timeout");
                assert_eq!(color.as_deref(), Some(COLOR_ERROR));
            }
            other => panic!("expected a badge, got {other:?}"),
        }
    }
}
