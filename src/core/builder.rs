//! 远程构建 - 提交构建请求并轮询到终止状态

use crate::error::{Result, SyncError};
use crate::storage::{BuildOutcome, BuildParams, BuildService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_FRAMEWORK_VERSION: &str = "3.5";
pub const DEFAULT_PURPOSE: &str = "debug";
/// 远程状态中表示构建成功的值
pub const STATUS_SUCCESS: &str = "finish";

/// 构建请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildRequest {
    pub platform: Option<String>,
    pub framework_version: Option<String>,
    pub purpose: Option<String>,
    /// 平台相关参数，原样提交
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl BuildRequest {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: Some(platform.into()),
            ..Default::default()
        }
    }

    /// 校验并补全默认值
    pub fn into_params(self) -> Result<BuildParams> {
        let platform = self
            .platform
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SyncError::Validation("Must specify build platform".to_string()))?;

        Ok(BuildParams {
            platform,
            framework_version: self
                .framework_version
                .unwrap_or_else(|| DEFAULT_FRAMEWORK_VERSION.to_string()),
            purpose: self.purpose.unwrap_or_else(|| DEFAULT_PURPOSE.to_string()),
            options: self.options,
        })
    }
}

/// 构建任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Finished,
    Errored,
}

/// 轮询中的构建任务，每次查询后作为进度发送
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub queue_id: String,
    pub state: JobState,
    pub description: String,
    pub attempt: u32,
}

/// 构建成功的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub queue_id: String,
    pub attempts: u32,
    pub artifact: serde_json::Value,
}

/// 构建编排器
pub struct BuildOrchestrator {
    service: Arc<dyn BuildService>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl BuildOrchestrator {
    pub fn new(service: Arc<dyn BuildService>) -> Self {
        Self {
            service,
            poll_interval: Duration::from_secs(1),
            max_attempts: 80,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_attempts = max_attempts;
        self
    }

    /// 校验参数并提交构建，返回 queue id
    pub async fn submit(&self, project_id: &str, request: BuildRequest) -> Result<String> {
        let params = request.into_params()?;

        info!(
            "提交构建: project={}, platform={}, purpose={}",
            project_id, params.platform, params.purpose
        );

        let queue_id = self.service.submit(project_id, &params).await?;
        debug!("构建已进入队列: {}", queue_id);
        Ok(queue_id)
    }

    /// 提交构建并等待结束
    pub async fn build(
        &self,
        project_id: &str,
        request: BuildRequest,
        progress_tx: Option<mpsc::UnboundedSender<BuildJob>>,
    ) -> Result<BuildResult> {
        let queue_id = self.submit(project_id, request).await?;
        self.wait(project_id, queue_id, progress_tx).await
    }

    /// 按固定间隔轮询构建状态直到完成、失败或超时
    pub async fn wait(
        &self,
        project_id: &str,
        queue_id: String,
        progress_tx: Option<mpsc::UnboundedSender<BuildJob>>,
    ) -> Result<BuildResult> {
        let mut job = BuildJob {
            queue_id,
            state: JobState::Running,
            description: String::new(),
            attempt: 0,
        };

        if self.max_attempts == 0 {
            return Err(Self::timed_out(job));
        }

        // 第一次查询在一个间隔之后；ticker 随函数返回一并释放
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            job.attempt += 1;

            let status = match self.service.poll_status(project_id, &job.queue_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("查询构建状态失败: {} - {}", job.queue_id, e);
                    return Err(e);
                }
            };

            job.description = status.description.clone();
            if status.finished {
                job.state = if status.status == STATUS_SUCCESS {
                    JobState::Finished
                } else {
                    JobState::Errored
                };
            }

            debug!(
                "构建状态 ({}/{}): {} {}",
                job.attempt, self.max_attempts, status.status, status.description
            );

            if let Some(tx) = &progress_tx {
                let _ = tx.send(job.clone());
            }

            match job.state {
                // 达到上限后立即返回，不再等待下一个间隔
                JobState::Running if job.attempt >= self.max_attempts => {
                    return Err(Self::timed_out(job));
                }
                JobState::Running => continue,
                JobState::Finished => return self.fetch_success(project_id, job).await,
                JobState::Errored => {
                    return Err(self.fetch_failure(project_id, &job).await);
                }
            }
        }
    }

    fn timed_out(job: BuildJob) -> SyncError {
        warn!("构建超时: {} ({} 次查询)", job.queue_id, job.attempt);
        SyncError::BuildTimeout {
            queue_id: job.queue_id,
            attempts: job.attempt,
        }
    }

    async fn fetch_success(&self, project_id: &str, job: BuildJob) -> Result<BuildResult> {
        match self.service.fetch_result(project_id, &job.queue_id).await? {
            BuildOutcome::Success(artifact) => {
                info!("构建成功: {} ({} 次查询)", job.queue_id, job.attempt);
                Ok(BuildResult {
                    queue_id: job.queue_id,
                    attempts: job.attempt,
                    artifact,
                })
            }
            BuildOutcome::Failure(message) => Err(SyncError::BuildFailed(message)),
        }
    }

    /// 获取失败原因；结果接口本身失败时返回该错误
    async fn fetch_failure(&self, project_id: &str, job: &BuildJob) -> SyncError {
        let message = match self.service.fetch_result(project_id, &job.queue_id).await {
            Ok(BuildOutcome::Failure(message)) => message,
            Ok(BuildOutcome::Success(payload)) => payload
                .get("error_message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| job.description.clone()),
            Err(e) => return e,
        };

        warn!("构建失败: {} - {}", job.queue_id, message);
        SyncError::BuildFailed(message)
    }
}
