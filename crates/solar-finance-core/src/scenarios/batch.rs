use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;

use crate::assumptions::ProjectAssumptions;
use crate::error::SolarFinanceError;
use crate::metrics::Metrics;
use crate::model::run_model;
use crate::types::*;
use crate::SolarFinanceResult;

/// Result for a single scenario. Exactly one of `metrics` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ScenarioOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Output of a scenario batch, in the order the scenarios were given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub scenarios: Vec<ScenarioOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Apply a JSON merge patch (RFC 7386) to `target` in place.
///
/// Objects merge key by key, `null` removes a key, anything else replaces
/// the target value outright.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn run_one(base: &Value, scenario: &Scenario) -> ScenarioOutcome {
    let mut doc = base.clone();
    merge_patch(&mut doc, &scenario.overrides);

    let result = serde_json::from_value::<ProjectAssumptions>(doc)
        .map_err(SolarFinanceError::from)
        .and_then(|assumptions| run_model(&assumptions));

    match result {
        Ok(out) => ScenarioOutcome {
            name: scenario.name.clone(),
            metrics: Some(out.result.metrics),
            error: None,
            warnings: out.warnings,
        },
        Err(e) => {
            log::warn!("scenario '{}' failed: {e}", scenario.name);
            ScenarioOutcome {
                name: scenario.name.clone(),
                metrics: None,
                error: Some(e.to_string()),
                warnings: Vec::new(),
            }
        }
    }
}

/// Run each scenario as an independent model run, in parallel.
///
/// A scenario that fails to deserialise or to compute is reported in its
/// outcome; the batch itself only fails if the base case cannot be
/// serialised or no scenarios are given.
pub fn run_scenarios(
    base: &ProjectAssumptions,
    scenarios: &[Scenario],
) -> SolarFinanceResult<ComputationOutput<BatchOutput>> {
    let start = Instant::now();
    let mut audit = AuditTrail::default();

    if scenarios.is_empty() {
        return Err(SolarFinanceError::config(
            "scenarios",
            "At least one scenario required",
        ));
    }

    let base_doc = serde_json::to_value(base)?;
    let outcomes: Vec<ScenarioOutcome> = scenarios
        .par_iter()
        .map(|s| run_one(&base_doc, s))
        .collect();

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    for o in outcomes.iter().filter(|o| !o.is_ok()) {
        audit.warn(format!(
            "scenario '{}' failed: {}",
            o.name,
            o.error.as_deref().unwrap_or_default()
        ));
    }

    let output = BatchOutput {
        succeeded: outcomes.len() - failed,
        failed,
        scenarios: outcomes,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    log::info!(
        "scenario batch: {} ok, {} failed in {elapsed}us",
        output.succeeded,
        output.failed
    );
    Ok(with_metadata(
        "Scenario batch (JSON merge-patch over base assumptions)",
        &serde_json::json!({
            "project_name": base.project_name,
            "scenarios": scenarios.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
        }),
        audit,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch_nested() {
        let mut doc = json!({"a": {"b": 1, "c": 2}, "d": 3});
        merge_patch(&mut doc, &json!({"a": {"b": 10}, "e": 4}));
        assert_eq!(doc, json!({"a": {"b": 10, "c": 2}, "d": 3, "e": 4}));
    }

    #[test]
    fn test_merge_patch_null_removes_key() {
        let mut doc = json!({"a": 1, "b": 2});
        merge_patch(&mut doc, &json!({"a": null}));
        assert_eq!(doc, json!({"b": 2}));
    }

    #[test]
    fn test_merge_patch_replaces_arrays_and_scalars() {
        let mut doc = json!({"a": [1, 2, 3], "b": {"x": 1}});
        merge_patch(&mut doc, &json!({"a": [9], "b": 5}));
        assert_eq!(doc, json!({"a": [9], "b": 5}));
    }

    #[test]
    fn test_merge_patch_non_object_patch_replaces_document() {
        let mut doc = json!({"a": 1});
        merge_patch(&mut doc, &json!("text"));
        assert_eq!(doc, json!("text"));
    }
}
