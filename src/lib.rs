use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use crate::core::{
    BuildOrchestrator, BuildRequest, SyncConfig, SyncEngine, SyncReport, TransferDirection,
    TransferProgress,
};
pub use config::{ClientConfig, ConfigStore, JsonConfigStore};
pub use error::{Result, SyncError};
pub use storage::{FileEntry, FileKind, FileTree, HttpRemote};

/// 客户端：按配置组装同步引擎与构建编排器
pub struct SyncClient {
    engine: SyncEngine,
    builder: BuildOrchestrator,
    config_dir: PathBuf,
}

impl SyncClient {
    /// 使用默认配置目录创建客户端
    pub fn from_default_dir() -> anyhow::Result<Self> {
        let config_dir = dirs::config_dir()
            .map(|p| p.join("monaca-sync"))
            .unwrap_or_else(|| PathBuf::from(".monaca-sync"));
        Self::new(&config_dir)
    }

    pub fn new(config_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config_dir)?;

        let config = ClientConfig::load(config_dir);
        let store = JsonConfigStore::new(config_dir);
        let remote = Arc::new(HttpRemote::new(&config, &store)?);

        tracing::debug!("使用配置目录: {:?}, API: {}", config_dir, config.api_root);

        let engine = SyncEngine::with_config(
            remote.clone(),
            SyncConfig {
                max_concurrent_transfers: config.max_concurrent_transfers,
                ..Default::default()
            },
        );
        let builder = BuildOrchestrator::new(remote).with_polling(
            Duration::from_millis(config.poll_interval_ms),
            config.max_poll_attempts,
        );

        Ok(Self {
            engine,
            builder,
            config_dir: config_dir.to_path_buf(),
        })
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn builder(&self) -> &BuildOrchestrator {
        &self.builder
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
