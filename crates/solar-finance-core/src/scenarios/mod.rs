pub mod batch;
pub mod sensitivity;

pub use batch::{merge_patch, run_scenarios, BatchOutput, ScenarioOutcome};
pub use sensitivity::{sensitivity_sweep, SensitivityInput, SensitivityOutput};
