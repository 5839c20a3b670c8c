/*
* Configuration for vman
* ----------------------
*
* Layers, lowest priority first:
*   1. built-in defaults (Settings::default)
*   2. <config dir>/default.toml   (optional)
*   3. <config dir>/local.toml     (optional)
*   4. file given with --config    (required if given)
*   5. VMAN_* environment variables, `__` separating sections,
*      e.g. VMAN_PLANNER__THRESHOLD_PERCENT=3
*
* The config dir is taken from VMAN_CONFIG_PATH and defaults to /etc/pve-vman.
*/

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::planner::{BalanceOptions, FlushOptions, DEFAULT_THRESHOLD_PERCENT, MAX_MIGRATIONS};

pub const DEFAULT_CONFIG_DIR: &str = "/etc/pve-vman";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub pve: PveSettings,
    pub planner: PlannerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PveSettings {
    /// Mount point of the cluster configuration file system.
    pub base_path: PathBuf,
    pub pvesh_bin: String,
    pub qmp_socket_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    pub max_migrations: usize,
    pub threshold_percent: u64,
    /// Nodes never used as migration source or target.
    pub exclude_nodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Storage types that allow online migration of the disks on them.
    pub migrateable_types: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pve: PveSettings {
                base_path: PathBuf::from("/etc/pve"),
                pvesh_bin: "pvesh".to_string(),
                qmp_socket_dir: PathBuf::from("/run/qemu-server"),
            },
            planner: PlannerSettings {
                max_migrations: MAX_MIGRATIONS,
                threshold_percent: DEFAULT_THRESHOLD_PERCENT,
                exclude_nodes: Vec::new(),
            },
            storage: StorageSettings {
                migrateable_types: vec!["rbd".into(), "nfs".into(), "iscsi".into()],
            },
        }
    }
}

impl Settings {
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("VMAN_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_DIR.to_string());
        Self::load_from(Path::new(&config_path), explicit)
    }

    pub fn load_from(config_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        info!("Loading configuration from path: {}", config_dir.display());

        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(&config_dir.join("default").to_string_lossy()).required(false))
            .add_source(File::with_name(&config_dir.join("local").to_string_lossy()).required(false));

        if let Some(path) = explicit {
            info!("Loading configuration file: {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(Environment::with_prefix("VMAN").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn balance_options(&self) -> BalanceOptions {
        BalanceOptions {
            iterations: self.planner.max_migrations,
            threshold_percent: self.planner.threshold_percent,
            exclude: self.planner.exclude_nodes.iter().cloned().collect(),
        }
    }

    pub fn flush_options(&self) -> FlushOptions {
        FlushOptions {
            only_ha: false,
            max_migrations: self.planner.max_migrations,
            exclude: self.planner.exclude_nodes.iter().cloned().collect(),
        }
    }
}

pub fn generate_default_config() -> Settings {
    Settings::default()
}
