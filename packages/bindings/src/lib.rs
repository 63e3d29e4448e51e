use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use solar_finance_core::assumptions::ProjectAssumptions;
use solar_finance_core::Scenario;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[napi]
pub fn run_model(input_json: String) -> NapiResult<String> {
    let input: ProjectAssumptions = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = solar_finance_core::run_model(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn project_metrics(input_json: String) -> NapiResult<String> {
    let input: ProjectAssumptions = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = solar_finance_core::run_model(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output.result.metrics.as_map()).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BatchRequest {
    base: ProjectAssumptions,
    scenarios: Vec<Scenario>,
}

#[derive(Deserialize)]
struct SweepRequest {
    base: ProjectAssumptions,
    #[serde(flatten)]
    sweep: solar_finance_core::scenarios::SensitivityInput,
}

#[napi]
pub fn run_scenarios(input_json: String) -> NapiResult<String> {
    let input: BatchRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = solar_finance_core::scenarios::run_scenarios(&input.base, &input.scenarios)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn sensitivity_sweep(input_json: String) -> NapiResult<String> {
    let input: SweepRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = solar_finance_core::scenarios::sensitivity_sweep(&input.base, &input.sweep)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
