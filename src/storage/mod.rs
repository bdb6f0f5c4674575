pub mod http;
pub mod local;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use http::HttpRemote;
pub use local::LocalProject;

// ============ 公共常量 ============

/// 请求超时（秒）
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// 条目类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileKind {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "dir")]
    Directory,
}

/// 文件树条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// 以 "/" 开头的项目内路径；远程返回的树以 key 为准
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(rename = "hash", default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl FileEntry {
    pub fn file(path: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::File,
            content_hash: Some(hash.into()),
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Directory,
            content_hash: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// 路径 -> 条目，按路径排序
pub type FileTree = BTreeMap<String, FileEntry>;

/// 构建参数（已补全默认值）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildParams {
    pub platform: String,
    pub framework_version: String,
    pub purpose: String,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// 构建状态查询结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildStatus {
    pub finished: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
}

/// 构建结果接口的返回
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Success(serde_json::Value),
    Failure(String),
}

/// 远程项目文件接口
#[async_trait]
pub trait RemoteTreeClient: Send + Sync {
    /// 获取远程项目文件树
    async fn get_tree(&self, project_id: &str) -> Result<FileTree>;

    /// 读取单个文件
    async fn read_file(&self, project_id: &str, path: &str) -> Result<Bytes>;

    /// 保存单个文件
    async fn save_file(&self, project_id: &str, path: &str, data: Bytes) -> Result<()>;

    /// 获取名称（用于日志）
    fn name(&self) -> &str;
}

/// 远程构建接口
#[async_trait]
pub trait BuildService: Send + Sync {
    /// 提交构建，返回 queue id
    async fn submit(&self, project_id: &str, params: &BuildParams) -> Result<String>;

    async fn poll_status(&self, project_id: &str, queue_id: &str) -> Result<BuildStatus>;

    async fn fetch_result(&self, project_id: &str, queue_id: &str) -> Result<BuildOutcome>;
}

/// 将各平台路径统一为以 "/" 开头的正斜杠路径
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let trimmed = path.trim_start_matches('/');
    format!("/{}", trimmed)
}
