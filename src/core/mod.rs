pub mod files;
pub mod pvesh;
pub mod qmp;
pub mod snapshot;

// platform side of the planner: what it reads and what it runs
pub use files::PveFiles;
pub use pvesh::{CommandOutput, PveSh, PveshRunner};
pub use qmp::QemuMonitor;
pub use snapshot::{build_cluster, PlatformData, SnapshotSource};
