use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::container::Member;
use super::percent;
use crate::errors::ContainerKind;

/// Guest flavour as used in PVE API paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmType {
    Qemu,
    Lxc,
}

impl VmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmType::Qemu => "qemu",
            VmType::Lxc => "lxc",
        }
    }
}

impl fmt::Display for VmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HA manager state of a guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaState {
    pub managed: bool,
    pub enabled: bool,
    pub group: Option<String>,
}

/// A guest as seen at snapshot time.
///
/// The origin node is fixed on construction. Moving a VM in a working copy
/// changes which node owns it, never the VM itself, so `origin_node` always
/// names the node the VM was on when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    id: u32,
    vm_type: VmType,
    origin_node: String,
    mem_used: u64,
    mem_provisioned: u64,
    migrateable: bool,
    ha: HaState,
    name: Option<String>,
    status: Option<String>,
    extra: BTreeMap<String, serde_json::Value>,
}

impl Vm {
    pub fn new(id: u32, vm_type: VmType, origin_node: impl Into<String>) -> Self {
        Self {
            id,
            vm_type,
            origin_node: origin_node.into(),
            mem_used: 0,
            mem_provisioned: 0,
            migrateable: false,
            ha: HaState::default(),
            name: None,
            status: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_memory(mut self, used: u64, provisioned: u64) -> Self {
        self.mem_used = used;
        self.mem_provisioned = provisioned;
        self
    }

    pub fn with_migrateable(mut self, migrateable: bool) -> Self {
        self.migrateable = migrateable;
        self
    }

    pub fn with_ha(mut self, ha: HaState) -> Self {
        self.ha = ha;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Platform attributes not modelled explicitly.
    pub fn with_extra(mut self, extra: BTreeMap<String, serde_json::Value>) -> Self {
        self.extra = extra;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn vm_type(&self) -> VmType {
        self.vm_type
    }

    pub fn origin_node(&self) -> &str {
        &self.origin_node
    }

    pub fn mem_used(&self) -> u64 {
        self.mem_used
    }

    pub fn mem_provisioned(&self) -> u64 {
        self.mem_provisioned
    }

    /// Used memory as a truncated integer percentage of provisioned memory.
    pub fn mem_used_percent(&self) -> u64 {
        percent(self.mem_used, self.mem_provisioned)
    }

    pub fn is_migrateable(&self) -> bool {
        self.migrateable
    }

    pub fn ha(&self) -> &HaState {
        &self.ha
    }

    pub fn is_ha_managed(&self) -> bool {
        self.ha.managed
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn extra(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extra
    }

    /// Whether the VM has to be migrated to end up on `node`.
    pub fn needs_move(&self, node: &str) -> bool {
        self.origin_node != node
    }
}

impl Member for Vm {
    type Key = u32;
    const KIND: ContainerKind = ContainerKind::Vm;

    fn key(&self) -> &u32 {
        &self.id
    }
}

impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VM {}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_percent_truncates() {
        let vm = Vm::new(100, VmType::Qemu, "pve1").with_memory(1, 3);
        assert_eq!(vm.mem_used_percent(), 33);

        let unprovisioned = Vm::new(101, VmType::Lxc, "pve1").with_memory(5, 0);
        assert_eq!(unprovisioned.mem_used_percent(), 0);
    }

    #[test]
    fn test_needs_move() {
        let vm = Vm::new(100, VmType::Qemu, "pve1");
        assert!(!vm.needs_move("pve1"));
        assert!(vm.needs_move("pve2"));
    }

    #[test]
    fn test_vm_type_serde() {
        let t: VmType = serde_json::from_str("\"lxc\"").unwrap();
        assert_eq!(t, VmType::Lxc);
        assert_eq!(VmType::Qemu.to_string(), "qemu");
    }
}
