//! Minimal QEMU Machine Protocol client over the per-VM unix socket.

use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::trace;

use crate::errors::MonitorError;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-device counters from `query-blockstats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BlockCounters {
    #[serde(default)]
    pub rd_bytes: u64,
    #[serde(default)]
    pub rd_operations: u64,
    #[serde(default)]
    pub wr_bytes: u64,
    #[serde(default)]
    pub wr_operations: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockStats {
    #[serde(default)]
    pub device: Option<String>,
    pub stats: BlockCounters,
}

pub struct QemuMonitor {
    stream: BufReader<UnixStream>,
}

impl QemuMonitor {
    /// Monitor socket of a VM inside `dir` (PVE keeps them as `<vmid>.qmp`).
    pub fn socket_path(dir: &Path, vmid: u32) -> PathBuf {
        dir.join(format!("{}.qmp", vmid))
    }

    /// Connect and negotiate capabilities.
    pub async fn connect(path: &Path) -> Result<Self, MonitorError> {
        if !path.exists() {
            return Err(MonitorError::NoSocket {
                path: path.display().to_string(),
            });
        }

        let stream = UnixStream::connect(path).await?;
        let mut monitor = Self {
            stream: BufReader::new(stream),
        };

        // greeting
        monitor.read_message().await?;
        monitor.execute("qmp_capabilities", None).await?;

        Ok(monitor)
    }

    /// Run a command and return its `return` payload.
    pub async fn execute(&mut self, command: &str, arguments: Option<Value>) -> Result<Value, MonitorError> {
        let mut request = json!({ "execute": command });
        if let Some(arguments) = arguments {
            request["arguments"] = arguments;
        }

        let mut line = serde_json::to_vec(&request)?;
        line.extend_from_slice(b"\r\n");
        self.stream.get_mut().write_all(&line).await?;

        loop {
            let reply = self.read_message().await?;
            // asynchronous events can arrive before the reply
            if reply.get("event").is_some() {
                continue;
            }
            if let Some(ret) = reply.get("return") {
                return Ok(ret.clone());
            }
            if let Some(err) = reply.get("error") {
                return Err(MonitorError::Command {
                    class: err["class"].as_str().unwrap_or("GenericError").to_string(),
                    desc: err["desc"].as_str().unwrap_or_default().to_string(),
                });
            }
        }
    }

    pub async fn query_blockstats(&mut self) -> Result<Vec<BlockStats>, MonitorError> {
        let ret = self.execute("query-blockstats", None).await?;
        Ok(serde_json::from_value(ret)?)
    }

    async fn read_message(&mut self) -> Result<Value, MonitorError> {
        let mut line = String::new();
        let read = timeout(REPLY_TIMEOUT, self.stream.read_line(&mut line))
            .await
            .map_err(|_| MonitorError::Timeout(REPLY_TIMEOUT))??;
        if read == 0 {
            return Err(MonitorError::Closed);
        }

        trace!(message = line.trim(), "qmp");
        Ok(serde_json::from_str(&line)?)
    }
}

/// Sum of counters over all block devices of a VM.
pub fn total_counters(stats: &[BlockStats]) -> BlockCounters {
    stats.iter().fold(BlockCounters::default(), |acc, s| BlockCounters {
        rd_bytes: acc.rd_bytes + s.stats.rd_bytes,
        rd_operations: acc.rd_operations + s.stats.rd_operations,
        wr_bytes: acc.wr_bytes + s.stats.wr_bytes,
        wr_operations: acc.wr_operations + s.stats.wr_operations,
    })
}

/// Connect to a VM's monitor and fetch its summed block counters.
pub async fn query_blockstats(path: &Path) -> Result<BlockCounters, MonitorError> {
    let mut monitor = QemuMonitor::connect(path).await?;
    let stats = monitor.query_blockstats().await?;
    Ok(total_counters(&stats))
}
