use clap::Args;
use serde_json::{json, Value};

use solar_finance_core::assumptions::ProjectAssumptions;
use solar_finance_core::run_model;

use crate::input;

/// Arguments shared by every single-project command
#[derive(Args)]
pub struct ModelArgs {
    /// Path to project assumptions (JSON, or YAML by .yaml/.yml extension);
    /// read from stdin when omitted
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for printing the period ledger
#[derive(Args)]
pub struct LedgerArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Only print operating periods
    #[arg(long)]
    pub operating_only: bool,
}

fn load(args: &ModelArgs) -> Result<ProjectAssumptions, Box<dyn std::error::Error>> {
    let assumptions: ProjectAssumptions = input::load(args.input.as_deref(), "a model run")?;
    log::info!(
        "running '{}': {} construction months, {} operating years",
        assumptions.project_name,
        assumptions.construction_months,
        assumptions.operating_years
    );
    Ok(assumptions)
}

fn log_outcome(warnings: &[String], defaults_applied: &[String]) {
    log::info!(
        "model finished with {} warnings, {} defaults applied",
        warnings.len(),
        defaults_applied.len()
    );
    for w in warnings {
        log::debug!("warning: {w}");
    }
}

/// Full model run: metrics, ledger and every component summary.
pub fn run_full(args: ModelArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let assumptions = load(&args)?;
    let result = run_model(&assumptions)?;
    log_outcome(&result.warnings, &result.defaults_applied);
    Ok(serde_json::to_value(result)?)
}

/// Model run reduced to the headline metrics.
pub fn run_metrics(args: ModelArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let assumptions = load(&args)?;
    let out = run_model(&assumptions)?;
    log_outcome(&out.warnings, &out.defaults_applied);
    Ok(json!({
        "result": out.result.metrics.as_map(),
        "methodology": out.methodology,
        "warnings": out.warnings,
        "defaults_applied": out.defaults_applied,
        "metadata": out.metadata,
    }))
}

/// Model run reduced to the period-by-period waterfall.
pub fn run_ledger(args: LedgerArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let assumptions = load(&args.model)?;
    let out = run_model(&assumptions)?;
    let rows: Vec<_> = out
        .result
        .ledger
        .rows()
        .iter()
        .filter(|r| !(args.operating_only && r.is_pre_cod))
        .collect();
    log_outcome(&out.warnings, &out.defaults_applied);
    log::debug!("ledger: {} of {} periods selected", rows.len(), out.result.ledger.rows().len());
    Ok(json!({
        "result": rows,
        "methodology": out.methodology,
        "warnings": out.warnings,
        "metadata": out.metadata,
    }))
}
