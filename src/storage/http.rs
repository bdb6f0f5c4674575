use super::{
    normalize_path, BuildOutcome, BuildParams, BuildService, BuildStatus, FileTree,
    RemoteTreeClient,
};
use crate::config::{ClientConfig, ConfigStore};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// API 响应外层结构
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    message: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct QueueResult {
    queue_id: String,
}

/// 基于 HTTP API 的远程项目与构建服务
pub struct HttpRemote {
    client: reqwest::Client,
    api_root: String,
    name: String,
}

impl HttpRemote {
    pub fn new(config: &ClientConfig, store: &dyn ConfigStore) -> Result<Self> {
        let api_root = config.api_root.trim_end_matches('/').to_string();

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

        let proxy_key = if api_root.starts_with("https://") {
            "https_proxy"
        } else {
            "http_proxy"
        };
        if let Some(proxy) = store.get(proxy_key).or_else(|| store.get("http_proxy")) {
            debug!("使用代理: {}", proxy);
            let proxy = reqwest::Proxy::all(&proxy)
                .map_err(|e| SyncError::Validation(format!("invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        let name = format!("http:{}", api_root);

        Ok(Self {
            client,
            api_root,
            name,
        })
    }

    fn url(&self, project_id: &str, tail: &str) -> String {
        format!(
            "{}/project/{}/{}",
            self.api_root,
            urlencoding::encode(project_id),
            tail
        )
    }

    fn file_url(&self, project_id: &str, action: &str, path: &str) -> String {
        format!(
            "{}?path={}",
            self.url(project_id, &format!("file/{}", action)),
            urlencoding::encode(path)
        )
    }

    /// 非 2xx 响应转换为 RemoteError，尽量取出服务端的 message
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty());

        Err(SyncError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    async fn result<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let bytes = Self::check(response).await?.bytes().await?;
        Self::parse_result(&bytes)
    }

    fn parse_result<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
        let envelope: Envelope<T> = serde_json::from_slice(body)?;
        envelope.result.ok_or_else(|| SyncError::Remote {
            status: 200,
            message: Some(
                envelope
                    .message
                    .unwrap_or_else(|| "response has no result".to_string()),
            ),
        })
    }

    fn parse_tree(body: &[u8]) -> Result<FileTree> {
        let tree: FileTree = Self::parse_result(body)?;
        Ok(tree
            .into_iter()
            .map(|(path, mut entry)| {
                let path = normalize_path(&path);
                entry.path = path.clone();
                (path, entry)
            })
            .collect())
    }

    fn parse_outcome(payload: serde_json::Value) -> BuildOutcome {
        match payload.get("error_message").and_then(|m| m.as_str()) {
            Some(message) if !message.is_empty() => BuildOutcome::Failure(message.to_string()),
            _ => BuildOutcome::Success(payload),
        }
    }
}

#[async_trait]
impl RemoteTreeClient for HttpRemote {
    async fn get_tree(&self, project_id: &str) -> Result<FileTree> {
        let response = self
            .client
            .get(self.url(project_id, "file/tree"))
            .send()
            .await?;
        let body = Self::check(response).await?.bytes().await?;
        Self::parse_tree(&body)
    }

    async fn read_file(&self, project_id: &str, path: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(self.file_url(project_id, "read", path))
            .send()
            .await?;
        Ok(Self::check(response).await?.bytes().await?)
    }

    async fn save_file(&self, project_id: &str, path: &str, data: Bytes) -> Result<()> {
        let response = self
            .client
            .post(self.file_url(project_id, "save", path))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl BuildService for HttpRemote {
    async fn submit(&self, project_id: &str, params: &BuildParams) -> Result<String> {
        let response = self
            .client
            .post(self.url(project_id, "build"))
            .json(params)
            .send()
            .await?;
        let queued: QueueResult = Self::result(response).await?;
        Ok(queued.queue_id)
    }

    async fn poll_status(&self, project_id: &str, queue_id: &str) -> Result<BuildStatus> {
        let response = self
            .client
            .get(self.url(
                project_id,
                &format!("build/status/{}", urlencoding::encode(queue_id)),
            ))
            .send()
            .await?;
        Self::result(response).await
    }

    async fn fetch_result(&self, project_id: &str, queue_id: &str) -> Result<BuildOutcome> {
        let response = self
            .client
            .get(self.url(
                project_id,
                &format!("build/result/{}", urlencoding::encode(queue_id)),
            ))
            .send()
            .await?;
        let payload: serde_json::Value = Self::result(response).await?;
        Ok(Self::parse_outcome(payload))
    }
}
