use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;

use super::batch::run_scenarios;
use crate::assumptions::ProjectAssumptions;
use crate::error::SolarFinanceError;
use crate::types::*;
use crate::SolarFinanceResult;

/// Input for a one-way sensitivity sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityInput {
    /// Variable to sweep; `name` is a dotted path into the assumptions
    /// (e.g. "commercial.Ppa.base_price_per_mwh")
    pub variable: SensitivityVariable,
    /// Metric to report, as named in the metrics map (e.g. "equity_irr_after_tax")
    pub output_metric: String,
}

/// Output of a one-way sensitivity sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub variable_name: String,
    pub values: Vec<Decimal>,
    pub output_metric: String,
    /// results[i] = metric when the variable equals values[i]; `Undefined`
    /// also marks a failed run (see warnings)
    pub results: Vec<MetricValue>,
    /// Value at the point closest to the middle of the range
    pub base_case_value: MetricValue,
    pub base_case_position: usize,
}

/// Generate the sweep values for a sensitivity variable from min to max with step.
fn generate_sweep_values(var: &SensitivityVariable) -> SolarFinanceResult<Vec<Decimal>> {
    let field = format!("variable:{}", var.name);
    if var.step <= Decimal::ZERO {
        return Err(SolarFinanceError::config(&field, "Step must be positive"));
    }
    if var.min > var.max {
        return Err(SolarFinanceError::config(&field, "Min must be <= max"));
    }

    let mut values = Vec::new();
    let mut current = var.min;
    while current <= var.max {
        values.push(current);
        current += var.step;
    }
    // Ensure max is included if step doesn't land exactly on it
    if let Some(&last) = values.last() {
        if last < var.max {
            values.push(var.max);
        }
    }

    Ok(values)
}

/// Find the closest index to a target value in a sorted list.
fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Whole numbers go in as JSON integers so counts (years, months) still
/// deserialise; anything fractional goes in as a decimal string.
fn json_value(value: Decimal) -> Value {
    if value.fract().is_zero() {
        if let Ok(i) = i64::try_from(value) {
            return Value::from(i);
        }
    }
    Value::String(value.normalize().to_string())
}

/// Merge patch setting a dotted path to a value.
pub fn path_override(path: &str, value: Decimal) -> SolarFinanceResult<Value> {
    let keys: Vec<&str> = path.split('.').collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(SolarFinanceError::config(
            "variable.name",
            format!("'{path}' is not a dotted field path"),
        ));
    }
    let mut patch = json_value(value);
    for key in keys.iter().rev() {
        let mut obj = Map::new();
        obj.insert((*key).to_string(), patch);
        patch = Value::Object(obj);
    }
    Ok(patch)
}

/// Sweep one assumption over its range and report one metric per point.
///
/// Each point is a scenario run through the batch runner, so the sweep runs
/// in parallel and a failing point is reported without aborting the rest.
pub fn sensitivity_sweep(
    base: &ProjectAssumptions,
    input: &SensitivityInput,
) -> SolarFinanceResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let mut audit = AuditTrail::default();

    let values = generate_sweep_values(&input.variable)?;
    let scenarios = values
        .iter()
        .map(|v| {
            Ok(Scenario {
                name: format!("{} = {v}", input.variable.name),
                overrides: path_override(&input.variable.name, *v)?,
            })
        })
        .collect::<SolarFinanceResult<Vec<_>>>()?;

    let batch = run_scenarios(base, &scenarios)?;
    audit.warnings.extend(batch.warnings);

    let mut results = Vec::with_capacity(values.len());
    for outcome in &batch.result.scenarios {
        let value = match &outcome.metrics {
            Some(m) => *m.as_map().get(&input.output_metric).ok_or_else(|| {
                SolarFinanceError::config(
                    "output_metric",
                    format!("unknown metric '{}'", input.output_metric),
                )
            })?,
            None => MetricValue::Undefined,
        };
        results.push(value);
    }

    let mid = (input.variable.min + input.variable.max) / Decimal::TWO;
    let base_case_position = closest_index(&values, mid);
    let base_case_value = results
        .get(base_case_position)
        .copied()
        .unwrap_or(MetricValue::Undefined);

    let output = SensitivityOutput {
        variable_name: input.variable.name.clone(),
        values,
        output_metric: input.output_metric.clone(),
        results,
        base_case_value,
        base_case_position,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-way sensitivity sweep",
        &serde_json::json!({
            "project_name": base.project_name,
            "variable": input.variable.name,
            "output_metric": input.output_metric,
        }),
        audit,
        elapsed,
        output,
    ))
}
