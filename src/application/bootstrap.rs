use crate::infrastructure::config::{ensure_default_configs, load_monitor_config, MonitorConfig};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DATABASE_FILE: &str = "taskbell.sqlite";

#[derive(Debug, Clone)]
pub struct BootstrapResult {
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub db_path: PathBuf,
    pub config: MonitorConfig,
}

/// Prepares an application workspace under `root`: the directory layout, the
/// default config files, and the database schema. Safe to call on every
/// launch; existing files are left as they are.
pub fn bootstrap_workspace(root: &Path) -> Result<BootstrapResult, CoreError> {
    let config_dir = root.join("config");
    let state_dir = root.join("state");
    let logs_dir = root.join("logs");
    for dir in [&config_dir, &state_dir, &logs_dir] {
        fs::create_dir_all(dir)?;
    }

    ensure_default_configs(&config_dir)?;
    let config = load_monitor_config(&config_dir);

    let db_path = state_dir.join(DATABASE_FILE);
    initialize_database(&db_path)?;

    info!(root = %root.display(), "workspace ready");
    Ok(BootstrapResult {
        config_dir,
        state_dir,
        logs_dir,
        db_path,
        config,
    })
}
