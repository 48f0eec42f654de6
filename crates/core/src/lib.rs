pub mod config;
pub mod points;
pub mod record;
pub mod report;

pub use config::Config;
pub use report::{BranchFailure, EntityKind, RunCounters, RunReport};
