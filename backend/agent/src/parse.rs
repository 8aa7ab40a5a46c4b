//! Lenient extraction of the JSON objects the model is asked to produce.
//!
//! Models wrap JSON in prose or code fences, rename keys, and drop fields.
//! Everything here degrades instead of failing: a bad classification turns
//! into the fallback intent, and a bad plan into no plan.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::warn;

use hearth_core::{ActionPlan, Intent, IntentCategory, PlanStep, RiskLevel};

/// Slice from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn object(text: &str) -> Result<Option<Map<String, Value>>, serde_json::Error> {
    let Some(raw) = extract_json(text) else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Ok(None),
    }
}

fn str_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| map.get(*k).and_then(Value::as_str))
}

fn bool_field(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_bool))
        .unwrap_or(false)
}

fn risk_field(map: &Map<String, Value>, key: &str) -> RiskLevel {
    map.get(key)
        .and_then(Value::as_str)
        .map(RiskLevel::parse_lossy)
        .unwrap_or_default()
}

fn entities(value: Option<&Value>) -> HashMap<String, Vec<String>> {
    let Some(Value::Object(map)) = value else {
        return HashMap::new();
    };
    map.iter()
        .map(|(kind, values)| {
            let list = match values {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect(),
                Value::String(s) => vec![s.clone()],
                _ => Vec::new(),
            };
            (kind.clone(), list)
        })
        .filter(|(_, list)| !list.is_empty())
        .collect()
}

/// Parse a classification reply. Never fails.
pub fn parse_intent(text: &str) -> Intent {
    let map = match object(text) {
        Ok(Some(map)) => map,
        Ok(None) => {
            warn!("No JSON object in classification reply");
            return Intent::fallback("Could not parse classification");
        }
        Err(e) => {
            warn!(error = %e, "Invalid JSON in classification reply");
            return Intent::fallback(format!("JSON parse error: {e}"));
        }
    };

    let category = str_field(&map, &["intent", "category"])
        .map(IntentCategory::parse)
        .unwrap_or(IntentCategory::Other);
    let confidence = map.get("confidence").and_then(Value::as_f64).unwrap_or(0.5);

    let mut intent = Intent::new(category, confidence).with_risk(risk_field(&map, "risk_level"));
    intent.requires_approval = bool_field(&map, &["requires_approval"]);
    intent.entities = entities(map.get("entities"));
    intent.explanation = str_field(&map, &["explanation"]).unwrap_or_default().to_string();
    intent
}

fn parse_step(position: usize, value: &Value) -> Option<PlanStep> {
    let map = value.as_object()?;
    let tool = str_field(map, &["tool", "tool_name"])?;
    let index = ["step_number", "index"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_u64))
        .map(|n| n as usize)
        .unwrap_or(position + 1);
    let parameters = match map.get("parameters") {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => Value::Object(Map::new()),
    };
    let depends_on = map
        .get("depends_on")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_u64)
                .map(|n| n as usize)
                .collect()
        })
        .unwrap_or_default();

    let mut step = PlanStep::new(index, tool, parameters)
        .with_description(str_field(map, &["description"]).unwrap_or_default())
        .with_risk(risk_field(map, "risk_level"))
        .with_approval(bool_field(map, &["requires_approval"]));
    step.depends_on = depends_on;
    Some(step)
}

/// Parse a planning reply. `Ok(None)` when the reply holds no JSON object;
/// `Err` when it holds one that is not valid JSON.
pub fn parse_plan(text: &str) -> Result<Option<ActionPlan>, serde_json::Error> {
    let Some(map) = object(text)? else {
        return Ok(None);
    };

    let steps: Vec<PlanStep> = map
        .get("steps")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| parse_step(i, v))
                .collect()
        })
        .unwrap_or_default();

    let summary = str_field(&map, &["plan_summary", "summary"]).unwrap_or_default();
    let mut plan = ActionPlan::new(summary, steps, risk_field(&map, "total_risk_level"));
    if bool_field(&map, &["requires_user_confirmation", "requires_confirmation"]) {
        plan.requires_confirmation = true;
    }
    plan.confirmation_message = str_field(&map, &["confirmation_message"]).map(String::from);
    Ok(Some(plan))
}
