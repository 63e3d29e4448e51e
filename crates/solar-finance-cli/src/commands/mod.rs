pub mod model;
pub mod scenarios;
