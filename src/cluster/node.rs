use std::collections::BTreeMap;
use std::fmt;

use super::container::{Container, Member};
use super::percent;
use super::vm::Vm;
use crate::errors::ContainerKind;

/// A hypervisor host and the VMs currently placed on it.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    mem_total: u64,
    mem_used: u64,
    uptime: u64,
    extra: BTreeMap<String, serde_json::Value>,
    vms: Container<Vm>,
}

impl Node {
    pub fn new(name: impl Into<String>, mem_total: u64, mem_used: u64, uptime: u64) -> Self {
        Self {
            name: name.into(),
            mem_total,
            mem_used,
            uptime,
            extra: BTreeMap::new(),
            vms: Container::new(),
        }
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, serde_json::Value>) -> Self {
        self.extra = extra;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mem_total(&self) -> u64 {
        self.mem_total
    }

    pub fn mem_used(&self) -> u64 {
        self.mem_used
    }

    pub fn uptime(&self) -> u64 {
        self.uptime
    }

    pub fn is_online(&self) -> bool {
        self.uptime != 0
    }

    pub fn extra(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extra
    }

    pub fn vms(&self) -> &Container<Vm> {
        &self.vms
    }

    pub fn vms_mut(&mut self) -> &mut Container<Vm> {
        &mut self.vms
    }

    pub fn vm(&self, id: u32) -> Option<&Vm> {
        self.vms.get(&id)
    }

    pub fn migrateable_vms(&self) -> Vec<&Vm> {
        self.vms.filter(|vm| vm.is_migrateable())
    }

    pub fn mem_used_percent(&self) -> u64 {
        percent(self.mem_used, self.mem_total)
    }

    /// Sum of memory used by the VMs on this node.
    pub fn vm_mem_used(&self) -> u64 {
        self.vms.sum(|vm| vm.mem_used())
    }

    /// Sum of memory provisioned for the VMs on this node.
    pub fn vm_mem_provisioned(&self) -> u64 {
        self.vms.sum(|vm| vm.mem_provisioned())
    }

    /// Share of node memory taken by the VM working set. This is the metric
    /// the planner balances on.
    pub fn vm_used_percent(&self) -> u64 {
        percent(self.vm_mem_used(), self.mem_total)
    }

    pub fn vm_provisioned_percent(&self) -> u64 {
        percent(self.vm_mem_provisioned(), self.mem_total)
    }
}

impl Member for Node {
    type Key = String;
    const KIND: ContainerKind = ContainerKind::Node;

    fn key(&self) -> &String {
        &self.name
    }

    fn freeze_children(&mut self) {
        self.vms.freeze();
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node {}", self.name)
    }
}
