use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmanError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error("Cluster model error: {0}")]
    Model(#[from] ModelError),

    #[error("Migration failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("QEMU monitor error: {0}")]
    Monitor(#[from] MonitorError),
}

/// The caller named something that does not exist in the cluster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("node '{node}' doesn't exist")]
    UnknownNode { node: String },
}

/// No eligible source or target node under the current filters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("no node found to migrate from")]
    NoSourceNode,

    #[error("no node found to migrate to")]
    NoTargetNode,

    #[error("no target node found")]
    NoFlushTarget,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("{kind} container is frozen")]
    Frozen { kind: ContainerKind },

    #[error("{kind} '{key}' is already present")]
    DuplicateChild { kind: ContainerKind, key: String },

    #[error("{kind} '{key}' not found")]
    ChildNotFound { kind: ContainerKind, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Node,
    Vm,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Node => write!(f, "Node"),
            ContainerKind::Vm => write!(f, "VM"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("{migration} exited with return code {code}: {stderr}")]
    Failed {
        migration: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to spawn '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' was terminated by a signal")]
    Terminated { program: String },
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("pvesh {path} failed with return code {code}: {stderr}")]
    Command {
        path: String,
        code: i32,
        stderr: String,
    },

    #[error("invalid JSON from pvesh {path}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("guest {vmid} references unknown node '{node}'")]
    OrphanGuest { vmid: u32, node: String },

    #[error("guest {vmid} is listed on both '{first}' and '{second}'")]
    DuplicateGuest {
        vmid: u32,
        first: String,
        second: String,
    },

    #[error("malformed HA resource id '{sid}'")]
    HaResource { sid: String },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("no monitor socket at {path}, VM not running")]
    NoSocket { path: String },

    #[error("monitor I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("monitor did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("monitor closed the connection")]
    Closed,

    #[error("invalid monitor message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("monitor returned an error: {class}: {desc}")]
    Command { class: String, desc: String },
}

impl VmanError {
    /// Whether the error came from bad caller input rather than the cluster state.
    pub fn is_input(&self) -> bool {
        matches!(self, VmanError::Input(_))
    }
}

pub type VmanResult<T> = Result<T, VmanError>;
