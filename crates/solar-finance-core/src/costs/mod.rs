pub mod capex;
pub mod opex;

pub use capex::{build_capex_schedule, draw_weights, CapexSchedule, CapexSummary};
pub use opex::{build_opex_schedule, OpexBreakdown, OpexSchedule};
