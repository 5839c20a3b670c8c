//! In-memory cluster model: a cluster owns nodes, nodes own VMs.
//!
//! A [`ClusterSnapshot`] is the frozen, read-only view taken once per
//! invocation. Planning always happens on a [`Cluster`] obtained from
//! [`ClusterSnapshot::working_copy`], which shares nothing with the snapshot.

pub mod container;
pub mod node;
pub mod snapshot;
pub mod vm;

pub use container::{Container, Extremum, Member};
pub use node::Node;
pub use snapshot::ClusterSnapshot;
pub use vm::{HaState, Vm, VmType};

use crate::errors::{ContainerKind, ModelError};

/// `part * 100 / whole`, truncated. Zero when `whole` is zero.
pub fn percent(part: u64, whole: u64) -> u64 {
    if whole == 0 {
        return 0;
    }
    (u128::from(part) * 100 / u128::from(whole)) as u64
}

#[derive(Debug, Clone, Default)]
pub struct Cluster {
    nodes: Container<Node>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &Container<Node> {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(&name.to_string())
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    pub fn add_node(&mut self, node: Node) -> Result<&mut Node, ModelError> {
        self.nodes.add(node)
    }

    pub fn remove_node(&mut self, name: &str) -> Result<Node, ModelError> {
        self.nodes.remove(&name.to_string())
    }

    pub fn online_nodes(&self) -> Vec<&Node> {
        self.nodes.filter(|n| n.is_online())
    }

    pub fn is_frozen(&self) -> bool {
        self.nodes.is_frozen()
    }

    /// Sort and lock the node list and every node's VM list. Returns `false`
    /// when the cluster was already frozen.
    pub fn freeze(&mut self) -> bool {
        self.nodes.freeze()
    }

    /// Every VM of the cluster paired with the node that currently owns it.
    pub fn vms(&self) -> impl Iterator<Item = (&Node, &Vm)> + '_ {
        self.nodes
            .iter()
            .flat_map(|node| node.vms().iter().map(move |vm| (node, vm)))
    }

    pub fn vm_count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Vm) -> bool,
    {
        self.vms().filter(|(_, vm)| predicate(vm)).count()
    }

    /// Locate a VM by id, returning the owning node alongside it.
    pub fn find_vm(&self, id: u32) -> Option<(&Node, &Vm)> {
        self.vms().find(|(_, vm)| vm.id() == id)
    }

    /// Move a VM between nodes as a remove from `from` followed by an add to `to`.
    pub fn relocate(&mut self, vm_id: u32, from: &str, to: &str) -> Result<(), ModelError> {
        let target = self.node(to).ok_or_else(|| node_not_found(to))?;
        if target.vms().contains(&vm_id) {
            return Err(ModelError::DuplicateChild {
                kind: ContainerKind::Vm,
                key: vm_id.to_string(),
            });
        }

        let vm = self
            .node_mut(from)
            .ok_or_else(|| node_not_found(from))?
            .vms_mut()
            .remove(&vm_id)?;

        self.node_mut(to)
            .ok_or_else(|| node_not_found(to))?
            .vms_mut()
            .add(vm)?;

        Ok(())
    }

    pub fn mem_total(&self) -> u64 {
        self.nodes.aggregate(|n| n.mem_total(), |n| n.is_online())
    }

    pub fn mem_used(&self) -> u64 {
        self.nodes.aggregate(|n| n.mem_used(), |n| n.is_online())
    }

    pub fn mem_used_percent(&self) -> u64 {
        percent(self.mem_used(), self.mem_total())
    }

    pub fn vm_mem_used(&self) -> u64 {
        self.nodes.aggregate(|n| n.vm_mem_used(), |n| n.is_online())
    }

    pub fn vm_mem_provisioned(&self) -> u64 {
        self.nodes
            .aggregate(|n| n.vm_mem_provisioned(), |n| n.is_online())
    }

    pub fn vm_used_percent(&self) -> u64 {
        percent(self.vm_mem_used(), self.mem_total())
    }

    pub fn vm_provisioned_percent(&self) -> u64 {
        percent(self.vm_mem_provisioned(), self.mem_total())
    }
}

fn node_not_found(name: &str) -> ModelError {
    ModelError::ChildNotFound {
        kind: ContainerKind::Node,
        key: name.to_string(),
    }
}
