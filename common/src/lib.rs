pub mod bench;
pub mod config;
pub mod dataset;
pub mod error;
pub mod orchestrator;
pub mod plot;
pub mod run;
pub mod series;
pub mod util;
