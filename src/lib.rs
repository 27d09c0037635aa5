pub mod chart_type;
pub mod config;
pub mod drawable;
pub mod error;
pub mod exchange;
pub mod indicator;
pub mod model;
pub mod orchestrator;
pub mod renderer;
pub mod session;
