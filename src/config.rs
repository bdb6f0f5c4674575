//! 客户端配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// API 根地址
    #[serde(default = "default_api_root")]
    pub api_root: String,
    /// 构建状态轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 最大轮询次数，超过则视为构建超时
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    /// 最大并发传输数，0 表示不限制
    #[serde(default)]
    pub max_concurrent_transfers: usize,
    /// 单个请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_root() -> String {
    "https://ide.monaca.mobi/api".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_attempts() -> u32 {
    80
}

fn default_request_timeout_secs() -> u64 {
    crate::storage::REQUEST_TIMEOUT_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            max_concurrent_transfers: 0,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// 从配置文件加载客户端配置
    pub fn load(config_dir: &Path) -> Self {
        read_config(config_dir)
            .and_then(|config| config.get("client").cloned())
            .and_then(|client| serde_json::from_value::<ClientConfig>(client).ok())
            .unwrap_or_default()
    }

    /// 保存客户端配置（保留其它配置项）
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        let mut config = read_config(config_dir).unwrap_or_else(|| serde_json::json!({}));
        config["client"] = serde_json::to_value(self)?;
        write_config(config_dir, &config)
    }
}

/// 读取整个配置文件，不存在或损坏时返回 None
pub(crate) fn read_config(config_dir: &Path) -> Option<serde_json::Value> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    serde_json::from_str::<serde_json::Value>(&content)
        .ok()
        .filter(|v| v.is_object())
}

pub(crate) fn write_config(config_dir: &Path, config: &serde_json::Value) -> io::Result<()> {
    fs::create_dir_all(config_dir)?;
    fs::write(
        config_dir.join(CONFIG_FILE),
        serde_json::to_string_pretty(config)?,
    )
}

/// 只读配置查询（代理设置等）
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// 基于 config.json 顶层字符串字段的配置查询
pub struct JsonConfigStore {
    config_dir: PathBuf,
}

impl JsonConfigStore {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        // 每次查询都重新读取文件
        read_config(&self.config_dir)?
            .get(key)?
            .as_str()
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}
