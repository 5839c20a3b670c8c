pub mod cli;
pub mod cluster;
pub mod config;
pub mod core;
pub mod errors;
pub mod migration;
pub mod monitoring;
pub mod planner;
pub mod utils;

// Re-exports
pub use cluster::{Cluster, ClusterSnapshot, Node, Vm, VmType};
pub use errors::{VmanError, VmanResult};
pub use migration::{migrations, Executor, Migration};
pub use planner::{balance, flush, BalanceOptions, FlushOptions, PlanSummary};
