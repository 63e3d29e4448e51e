use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use solar_finance_core::assumptions::ProjectAssumptions;
use solar_finance_core::scenarios::{run_scenarios, sensitivity_sweep, SensitivityInput};
use solar_finance_core::{Scenario, SensitivityVariable};

use crate::input;

/// Arguments for a scenario batch
#[derive(Args)]
pub struct ScenariosArgs {
    /// Path to the base project assumptions
    #[arg(long)]
    pub base: String,

    /// Path to the scenario file: {"scenarios": [{"name", "overrides"}]};
    /// read from stdin when omitted
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for a one-way sensitivity sweep
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to the base project assumptions
    #[arg(long)]
    pub base: String,

    /// Variable to sweep in format path:min:max:step, where path is a
    /// dotted field path (e.g. "commercial.Ppa.base_price_per_mwh:40:70:5")
    #[arg(long)]
    pub var: String,

    /// Metric to report (e.g. "equity_irr_after_tax")
    #[arg(long, default_value = "equity_irr_after_tax")]
    pub metric: String,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    scenarios: Vec<Scenario>,
}

fn parse_sens_var(arg: &str) -> Result<SensitivityVariable, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = arg.split(':').collect();
    if parts.len() != 4 {
        return Err(format!(
            "Sensitivity variable must be path:min:max:step, got '{}'",
            arg
        )
        .into());
    }
    Ok(SensitivityVariable {
        name: parts[0].to_string(),
        min: parts[1].parse::<Decimal>()?,
        max: parts[2].parse::<Decimal>()?,
        step: parts[3].parse::<Decimal>()?,
    })
}

pub fn run_batch(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let base: ProjectAssumptions = input::file::read_document(&args.base)?;
    let file: ScenarioFile = input::load(args.input.as_deref(), "a scenario batch")?;

    log::info!("running {} scenarios against '{}'", file.scenarios.len(), base.project_name);

    let result = run_scenarios(&base, &file.scenarios)?;
    log::info!(
        "scenario batch finished: {} succeeded, {} failed",
        result.result.succeeded,
        result.result.failed
    );
    Ok(serde_json::to_value(result)?)
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let base: ProjectAssumptions = input::file::read_document(&args.base)?;
    let sweep = SensitivityInput {
        variable: parse_sens_var(&args.var)?,
        output_metric: args.metric,
    };

    log::info!(
        "sweeping {} from {} to {} by {} for {}",
        sweep.variable.name,
        sweep.variable.min,
        sweep.variable.max,
        sweep.variable.step,
        sweep.output_metric
    );

    let result = sensitivity_sweep(&base, &sweep)?;
    log::debug!("sweep produced {} points", result.result.values.len());
    Ok(serde_json::to_value(result)?)
}
