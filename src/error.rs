//! 错误类型

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// 同步与构建过程中的错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 本地文件系统访问失败（扫描或传输）
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 传输层失败，code 为简短的错误分类
    #[error("Network error ({code}): {message}")]
    Network { code: String, message: String },

    /// 远程接口返回非成功响应
    #[error("Remote error (HTTP {status}): {}", .message.as_deref().unwrap_or("no message"))]
    Remote { status: u16, message: Option<String> },

    #[error("Validation error: {0}")]
    Validation(String),

    /// 单个文件传输失败
    #[error("Transfer failed for {path}: {source}")]
    Transfer {
        path: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Build timed out after {attempts} status checks (queue {queue_id})")]
    BuildTimeout { queue_id: String, attempts: u32 },

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Invalid response: {0}")]
    Json(#[from] serde_json::Error),

    /// 后台任务 panic 或被运行时取消
    #[error("Task error: {0}")]
    Task(String),
}

impl SyncError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transfer(path: impl Into<String>, source: SyncError) -> Self {
        SyncError::Transfer {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        let code = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connect"
        } else if e.is_body() {
            "body"
        } else if e.is_decode() {
            "decode"
        } else {
            "request"
        };
        SyncError::Network {
            code: code.to_string(),
            message: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Task(e.to_string())
    }
}
