pub mod settings;

pub use settings::{
    generate_default_config, PlannerSettings, PveSettings, Settings, StorageSettings,
    DEFAULT_CONFIG_DIR,
};
