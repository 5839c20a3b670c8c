//! Builds a [`ClusterSnapshot`] from what the PVE API and config files report.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::files::{PveFiles, StorageConf, VmConf};
use super::pvesh::{PveSh, PveshRunner};
use crate::cluster::{Cluster, ClusterSnapshot, HaState, Node, Vm, VmType};
use crate::errors::SnapshotError;

/// One entry of `/cluster/resources`.
#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub vmid: Option<u32>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One entry of `/cluster/ha/resources`.
#[derive(Debug, Clone, Deserialize)]
pub struct HaResource {
    pub sid: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

impl HaResource {
    /// VM id from a service id like `vm:100` or `ct:101`.
    pub fn vmid(&self) -> Result<u32, SnapshotError> {
        self.sid
            .split_once(':')
            .and_then(|(_, id)| id.parse().ok())
            .ok_or_else(|| SnapshotError::HaResource {
                sid: self.sid.clone(),
            })
    }

    fn state(&self) -> HaState {
        HaState {
            managed: true,
            enabled: matches!(self.state.as_deref(), Some("enabled") | Some("started")),
            group: self.group.clone(),
        }
    }
}

/// Everything the builder reads from the platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformData {
    pub resources: Vec<Resource>,
    pub ha_resources: Vec<HaResource>,
    pub storages: StorageConf,
    pub vm_confs: BTreeMap<u32, (VmType, VmConf)>,
}

/// Assemble and freeze the cluster model.
///
/// A VM is migrateable unless one of its disks lives on a storage whose type
/// is not in `migrateable_types`. Storages missing from `storage.cfg` count
/// as not migrateable.
pub fn build_cluster(
    data: &PlatformData,
    migrateable_types: &[String],
) -> Result<ClusterSnapshot, SnapshotError> {
    let ha: BTreeMap<u32, &HaResource> = data
        .ha_resources
        .iter()
        .map(|hr| hr.vmid().map(|id| (id, hr)))
        .collect::<Result<_, _>>()?;

    let mut cluster = Cluster::new();

    for res in data.resources.iter().filter(|r| r.kind == "node") {
        let Some(name) = res.node.as_deref() else {
            warn!("node resource without a name");
            continue;
        };
        let node = Node::new(
            name,
            res.maxmem.unwrap_or(0),
            res.mem.unwrap_or(0),
            res.uptime.unwrap_or(0),
        )
        .with_extra(res.extra.clone());
        cluster.add_node(node)?;
    }

    for res in &data.resources {
        let vm_type = match res.kind.as_str() {
            "qemu" => VmType::Qemu,
            "lxc" => VmType::Lxc,
            _ => continue,
        };
        let (Some(vmid), Some(node_name)) = (res.vmid, res.node.as_deref()) else {
            warn!(kind = %res.kind, "guest resource without vmid or node");
            continue;
        };

        let migrateable = is_migrateable(
            vmid,
            data.vm_confs.get(&vmid).map(|(_, conf)| conf),
            &data.storages,
            migrateable_types,
        );
        let mut vm = Vm::new(vmid, vm_type, node_name)
            .with_memory(res.mem.unwrap_or(0), res.maxmem.unwrap_or(0))
            .with_migrateable(migrateable)
            .with_ha(ha.get(&vmid).map(|hr| hr.state()).unwrap_or_default())
            .with_extra(res.extra.clone());
        if let Some(name) = &res.name {
            vm = vm.with_name(name);
        }
        if let Some(status) = &res.status {
            vm = vm.with_status(status);
        }

        if let Some((first, _)) = cluster.find_vm(vmid) {
            return Err(SnapshotError::DuplicateGuest {
                vmid,
                first: first.name().to_string(),
                second: node_name.to_string(),
            });
        }

        let node = cluster
            .node_mut(node_name)
            .ok_or_else(|| SnapshotError::OrphanGuest {
                vmid,
                node: node_name.to_string(),
            })?;
        node.vms_mut().add(vm)?;
    }

    debug!(
        nodes = cluster.nodes().len(),
        vms = cluster.vm_count(|_| true),
        "cluster model built"
    );
    Ok(ClusterSnapshot::new(cluster))
}

fn is_migrateable(
    vmid: u32,
    conf: Option<&VmConf>,
    storages: &StorageConf,
    migrateable_types: &[String],
) -> bool {
    let Some(conf) = conf else {
        return true;
    };

    conf.disk_storages().into_iter().all(|storage| match storages.get(storage) {
        Some(entry) => migrateable_types.iter().any(|t| *t == entry.storage_type),
        None => {
            warn!(vmid, storage, "disk on storage missing from storage.cfg");
            false
        }
    })
}

/// Loads the live cluster state through pvesh and the config file system.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    runner: PveshRunner,
    files: PveFiles,
    migrateable_types: Vec<String>,
}

impl SnapshotSource {
    pub fn new(runner: PveshRunner, files: PveFiles, migrateable_types: Vec<String>) -> Self {
        Self {
            runner,
            files,
            migrateable_types,
        }
    }

    pub async fn collect(&self) -> Result<PlatformData, SnapshotError> {
        let resources: Vec<Resource> = self
            .runner
            .fetch(&PveSh::get("/cluster/resources").option("output-format", "json"))
            .await?;
        let ha_resources: Vec<HaResource> = self
            .runner
            .fetch(&PveSh::get("/cluster/ha/resources").option("output-format", "json"))
            .await?;

        Ok(PlatformData {
            resources,
            ha_resources,
            storages: self.files.storage_conf()?,
            vm_confs: self.files.vm_confs()?,
        })
    }

    pub async fn load(&self) -> Result<ClusterSnapshot, SnapshotError> {
        let data = self.collect().await?;
        let snapshot = build_cluster(&data, &self.migrateable_types)?;
        info!(
            nodes = snapshot.cluster().nodes().len(),
            vms = snapshot.cluster().vm_count(|_| true),
            "cluster snapshot loaded"
        );
        Ok(snapshot)
    }
}
