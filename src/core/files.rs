use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::cluster::VmType;
use crate::errors::SnapshotError;

/// One section of `storage.cfg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    pub storage_type: String,
    pub options: BTreeMap<String, String>,
}

pub type StorageConf = BTreeMap<String, StorageEntry>;

/// A guest configuration file from `nodes/<node>/<qemu-server|lxc>/<vmid>.conf`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmConf {
    pub options: BTreeMap<String, String>,
    pub pending: BTreeMap<String, String>,
}

fn disk_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:rootfs|(?:scsi|sata|virtio|ide|mount|mp)\d+)$")
            .expect("disk key pattern is valid")
    })
}

impl VmConf {
    /// Storage ids referenced by disk and mount point entries, e.g.
    /// `local-lvm` for `scsi0: local-lvm:vm-100-disk-0,size=32G`.
    pub fn disk_storages(&self) -> Vec<&str> {
        self.options
            .iter()
            .filter(|(key, _)| disk_key_pattern().is_match(key))
            .filter_map(|(_, value)| value.split_once(':').map(|(storage, _)| storage))
            .collect()
    }
}

pub fn parse_storage_cfg(text: &str) -> StorageConf {
    let mut conf = StorageConf::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (key, value) = match trimmed.split_once(char::is_whitespace) {
            Some((key, value)) => (key, value.trim()),
            None => (trimmed, ""),
        };

        if let Some(storage_type) = key.strip_suffix(':') {
            conf.insert(
                value.to_string(),
                StorageEntry {
                    name: value.to_string(),
                    storage_type: storage_type.to_string(),
                    options: BTreeMap::new(),
                },
            );
            current = Some(value.to_string());
        } else if let Some(entry) = current.as_ref().and_then(|name| conf.get_mut(name)) {
            entry.options.insert(key.to_string(), value.to_string());
        }
    }

    conf
}

/// Parse a guest config. `[PENDING]` opens the pending section; any other
/// `[...]` section is a snapshot and is skipped.
pub fn parse_vm_conf(text: &str) -> VmConf {
    enum Section {
        Main,
        Pending,
        Snapshot,
    }

    let mut conf = VmConf::default();
    let mut section = Section::Main;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with('[') {
            section = if trimmed == "[PENDING]" {
                Section::Pending
            } else {
                Section::Snapshot
            };
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let target = match section {
            Section::Main => &mut conf.options,
            Section::Pending => &mut conf.pending,
            Section::Snapshot => continue,
        };
        target.insert(key.trim().to_string(), value.trim().to_string());
    }

    conf
}

/// Reader for the cluster configuration file system (normally `/etc/pve`).
#[derive(Debug, Clone)]
pub struct PveFiles {
    base: PathBuf,
}

impl PveFiles {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Content of a file relative to the base path; a missing file reads as empty.
    pub fn read(&self, relative: &str) -> Result<String, SnapshotError> {
        read_optional(&self.base.join(relative))
    }

    pub fn storage_conf(&self) -> Result<StorageConf, SnapshotError> {
        Ok(parse_storage_cfg(&self.read("storage.cfg")?))
    }

    /// All guest configs keyed by VM id.
    pub fn vm_confs(&self) -> Result<BTreeMap<u32, (VmType, VmConf)>, SnapshotError> {
        let pattern = self.base.join("nodes").join("*").join("*").join("*.conf");
        let mut confs = BTreeMap::new();

        for entry in glob::glob(&pattern.to_string_lossy())? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable guest config");
                    continue;
                }
            };

            let vm_type = match path
                .parent()
                .and_then(Path::file_name)
                .and_then(|dir| dir.to_str())
            {
                Some("qemu-server") => VmType::Qemu,
                Some("lxc") => VmType::Lxc,
                _ => continue,
            };
            let Some(vmid) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u32>().ok())
            else {
                continue;
            };

            debug!(vmid, path = %path.display(), "reading guest config");
            let conf = parse_vm_conf(&read_optional(&path)?);
            confs.insert(vmid, (vm_type, conf));
        }

        Ok(confs)
    }
}

fn read_optional(path: &Path) -> Result<String, SnapshotError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(SnapshotError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORAGE_CFG: &str = "\
dir: local
\tpath /var/lib/vz
\tcontent iso,vztmpl,backup

rbd: ceph-vm
\tpool vm
\tcontent images,rootdir

iscsi: san
\tportal 10.0.0.5
\ttarget iqn.2017-01.example:storage
";

    const VM_CONF: &str = "\
#managed by terraform
boot: order=scsi0
cores: 2
ide2: none,media=cdrom
memory: 4096
scsi0: ceph-vm:vm-100-disk-0,size=32G
scsihw: virtio-scsi-pci

[PENDING]
memory: 8192

[before-upgrade]
scsi0: local:100/vm-100-disk-0.qcow2,size=32G
";

    #[test]
    fn test_parse_storage_cfg() {
        let conf = parse_storage_cfg(STORAGE_CFG);
        assert_eq!(conf.len(), 3);
        assert_eq!(conf["local"].storage_type, "dir");
        assert_eq!(conf["local"].options["path"], "/var/lib/vz");
        assert_eq!(conf["ceph-vm"].storage_type, "rbd");
        assert_eq!(conf["san"].options["target"], "iqn.2017-01.example:storage");
    }

    #[test]
    fn test_parse_vm_conf_sections() {
        let conf = parse_vm_conf(VM_CONF);
        assert_eq!(conf.options["memory"], "4096");
        assert_eq!(conf.pending["memory"], "8192");
        assert_eq!(conf.options["scsi0"], "ceph-vm:vm-100-disk-0,size=32G");
        assert!(!conf.options.contains_key("#managed by terraform"));
    }

    #[test]
    fn test_disk_storages() {
        let conf = parse_vm_conf(VM_CONF);
        assert_eq!(conf.disk_storages(), vec!["ceph-vm"]);

        let ct = parse_vm_conf("rootfs: local-lvm:vm-101-disk-0,size=8G\nmp0: san:0.0.1,mp=/data\n");
        assert_eq!(ct.disk_storages(), vec!["san", "local-lvm"]);
    }

    #[test]
    fn test_read_guest_configs_from_tree() {
        let dir = tempfile::tempdir().unwrap();
        let qemu = dir.path().join("nodes/pve1/qemu-server");
        let lxc = dir.path().join("nodes/pve2/lxc");
        let other = dir.path().join("nodes/pve2/openvz");
        for d in [&qemu, &lxc, &other] {
            fs::create_dir_all(d).unwrap();
        }
        fs::write(qemu.join("100.conf"), VM_CONF).unwrap();
        fs::write(lxc.join("101.conf"), "rootfs: local:101/vm-101-disk-0.raw\n").unwrap();
        fs::write(other.join("102.conf"), "memory: 512\n").unwrap();
        fs::write(dir.path().join("storage.cfg"), STORAGE_CFG).unwrap();

        let files = PveFiles::new(dir.path());
        let confs = files.vm_confs().unwrap();
        assert_eq!(confs.len(), 2);
        assert_eq!(confs[&100].0, VmType::Qemu);
        assert_eq!(confs[&101].0, VmType::Lxc);
        assert_eq!(files.storage_conf().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = PveFiles::new(dir.path());
        assert!(files.storage_conf().unwrap().is_empty());
        assert!(files.vm_confs().unwrap().is_empty());
    }
}
