use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::qmp::{self, BlockCounters};
use crate::errors::SnapshotError;

/// Per-second block I/O rates of one VM (or the sum over all VMs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IoRates {
    pub rd_bytes: f64,
    pub rd_operations: f64,
    pub wr_bytes: f64,
    pub wr_operations: f64,
}

impl IoRates {
    pub const KEYS: [&'static str; 4] = ["rd_bytes", "rd_operations", "wr_bytes", "wr_operations"];

    pub fn values(&self) -> [f64; 4] {
        [self.rd_bytes, self.rd_operations, self.wr_bytes, self.wr_operations]
    }

    fn add(&mut self, other: &IoRates) {
        self.rd_bytes += other.rd_bytes;
        self.rd_operations += other.rd_operations;
        self.wr_bytes += other.wr_bytes;
        self.wr_operations += other.wr_operations;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IoSample {
    pub per_vm: BTreeMap<u32, IoRates>,
    pub total: IoRates,
}

/// Samples block counters of all running VMs through their monitor sockets
/// and turns consecutive samples into rates.
///
/// Counters start at zero, so the first sample reports totals since VM start
/// divided by the interval.
pub struct VmIoSampler {
    socket_dir: PathBuf,
    interval: Duration,
    previous: BTreeMap<u32, BlockCounters>,
}

impl VmIoSampler {
    pub fn new(socket_dir: impl Into<PathBuf>, interval: Duration) -> Self {
        let socket_dir = socket_dir.into();
        info!(dir = %socket_dir.display(), ?interval, "initializing VM I/O sampler");
        Self {
            socket_dir,
            interval,
            previous: BTreeMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Monitor sockets found in the socket directory, sorted by VM id.
    pub fn sockets(&self) -> Result<Vec<(u32, PathBuf)>, SnapshotError> {
        let pattern = self.socket_dir.join("*.qmp");
        let mut sockets: Vec<(u32, PathBuf)> = glob::glob(&pattern.to_string_lossy())?
            .filter_map(Result::ok)
            .filter_map(|path| vmid_of(&path).map(|id| (id, path)))
            .collect();
        sockets.sort_by_key(|(id, _)| *id);
        Ok(sockets)
    }

    /// Query every monitor socket once. Counters of VMs whose socket is gone
    /// are forgotten.
    pub async fn sample(&mut self) -> Result<IoSample, SnapshotError> {
        let mut sample = IoSample::default();
        let sockets = self.sockets()?;
        self.previous.retain(|vmid, _| sockets.iter().any(|(id, _)| id == vmid));

        for (vmid, path) in sockets {
            let counters = match qmp::query_blockstats(&path).await {
                Ok(counters) => counters,
                Err(e) => {
                    debug!(vmid, error = %e, "skipping VM without usable monitor");
                    continue;
                }
            };

            let rates = self.record(vmid, counters);
            sample.total.add(&rates);
            sample.per_vm.insert(vmid, rates);
        }

        Ok(sample)
    }

    /// Store `counters` as the latest value for `vmid` and return the rates
    /// since the previous value. Counters that went backwards (VM restart)
    /// yield zero.
    pub fn record(&mut self, vmid: u32, counters: BlockCounters) -> IoRates {
        let previous = self.previous.insert(vmid, counters).unwrap_or_default();
        let secs = self.interval.as_secs_f64().max(f64::EPSILON);
        let rate = |now: u64, before: u64| now.saturating_sub(before) as f64 / secs;

        IoRates {
            rd_bytes: rate(counters.rd_bytes, previous.rd_bytes),
            rd_operations: rate(counters.rd_operations, previous.rd_operations),
            wr_bytes: rate(counters.wr_bytes, previous.wr_bytes),
            wr_operations: rate(counters.wr_operations, previous.wr_operations),
        }
    }
}

fn vmid_of(path: &Path) -> Option<u32> {
    path.file_stem()?.to_str()?.parse().ok()
}
