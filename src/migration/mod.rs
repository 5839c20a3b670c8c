//! Turning a planned placement into VM migrations and running them.

pub mod executor;

pub use executor::{ExecutionReport, Executor, RelocationBackend};

use serde::Serialize;
use std::fmt;

use crate::cluster::{Cluster, VmType};
use crate::core::pvesh::{self, PveSh};

/// One VM relocation needed to reach the planned placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub vm_id: u32,
    pub vm_type: VmType,
    pub source: String,
    pub target: String,
}

impl Migration {
    /// The online-migration call that performs this relocation.
    pub fn command(&self) -> PveSh {
        pvesh::migrate_vm(&self.source, self.vm_type, self.vm_id, &self.target)
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Migration: VM {} from {} to {}",
            self.vm_id, self.source, self.target
        )
    }
}

/// Migrations for every VM whose current node differs from the node it was
/// on at snapshot time.
///
/// Records are sorted by VM id. Callers should rely on the set of records,
/// not on their order.
pub fn migrations(planned: &Cluster) -> Vec<Migration> {
    let mut list: Vec<Migration> = planned
        .vms()
        .filter(|(node, vm)| vm.needs_move(node.name()))
        .map(|(node, vm)| Migration {
            vm_id: vm.id(),
            vm_type: vm.vm_type(),
            source: vm.origin_node().to_string(),
            target: node.name().to_string(),
        })
        .collect();

    list.sort_by_key(|m| m.vm_id);
    list
}
