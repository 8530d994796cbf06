//! Persistent configuration store.
//!
//! # Responsibilities
//! - Load the configuration file (validated)
//! - Persist a new configuration atomically (temp file + rename)
//! - Keep a best-effort `.bak` copy of the previous version
//!
//! # Design Decisions
//! - A single async writer lock serializes concurrent saves
//! - Configs are validated before anything touches the disk
//! - File IO runs on the blocking pool

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::config::loader::{load_config, prepare_config, render_config, ConfigError, ConfigFormat};
use crate::config::schema::SystemConfig;

/// File-backed configuration store.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the backup written before each save.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Load and validate the configuration from disk.
    pub async fn load(&self) -> Result<SystemConfig, ConfigError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_config(&path))
            .await
            .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?
    }

    /// Raw file content, or an empty string when the file does not exist.
    pub async fn read_raw(&self) -> Result<String, ConfigError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate and atomically persist a configuration.
    ///
    /// Returns the normalized configuration that was written.
    pub async fn save(&self, config: SystemConfig) -> Result<SystemConfig, ConfigError> {
        let config = prepare_config(config)?;

        let _guard = self.write_lock.lock().await;

        let format = match self.read_raw().await {
            Ok(existing) => ConfigFormat::detect(&self.path, &existing),
            Err(_) => ConfigFormat::detect(&self.path, ""),
        };
        let content = render_config(&config, format)?;

        let path = self.path.clone();
        let backup = self.backup_path();
        tokio::task::spawn_blocking(move || write_atomically(&path, &backup, &content))
            .await
            .map_err(|e| ConfigError::Io(std::io::Error::other(e)))??;

        tracing::info!(
            path = %self.path.display(),
            routes = config.routes.len(),
            "Configuration saved"
        );
        Ok(config)
    }
}

fn write_atomically(path: &Path, backup: &Path, content: &str) -> Result<(), ConfigError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    if path.exists() {
        if let Err(e) = fs::copy(path, backup) {
            tracing::warn!(backup = %backup.display(), error = %e, "Failed to write config backup");
        }
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".gateway-config")
        .suffix(".tmp")
        .tempfile_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ConfigError::Io(e.error))?;
    Ok(())
}
