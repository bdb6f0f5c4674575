//! 批量传输 - 并发执行、按完成顺序报告进度、首个失败即判定整批失败

use crate::error::{Result, SyncError};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// 传输方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "upload"),
            TransferDirection::Download => write!(f, "download"),
        }
    }
}

/// 单个文件的传输任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub path: String,
    pub direction: TransferDirection,
}

/// 传输进度，每个任务结束（成功或失败）时发送一次
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub path: String,
    pub completed_count: usize,
    pub total_count: usize,
}

/// 整批传输成功时的统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    pub total: usize,
    /// 按完成顺序排列的路径
    pub completed: Vec<String>,
}

/// 创建进度通道，接收端以 Stream 形式返回
///
/// 通道不设上限：发送方从不等待接收方，调用方可以先等待批次结束再读取进度。
pub fn progress_channel<T>() -> (mpsc::UnboundedSender<T>, UnboundedReceiverStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}

/// 传输协调器
pub struct TransferCoordinator {
    /// 最大并发数，0 表示不限制
    max_concurrent: usize,
}

impl TransferCoordinator {
    pub fn new() -> Self {
        Self { max_concurrent: 0 }
    }

    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// 并发执行一批传输任务。
    ///
    /// 每个任务在独立的 tokio 任务中运行；完成计数只在本函数的汇总循环中递增，
    /// 进度按完成顺序发送。任一任务失败时立即返回该错误，其余任务继续运行直到结束，
    /// 但其结果被丢弃，也不再发送进度。
    pub async fn run_batch<F, Fut>(
        &self,
        tasks: Vec<TransferTask>,
        transfer_one: F,
        progress_tx: Option<mpsc::UnboundedSender<TransferProgress>>,
    ) -> Result<BatchReport>
    where
        F: Fn(TransferTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let total = tasks.len();

        if total == 0 {
            debug!("批次 {} 没有需要传输的文件", batch_id);
            return Ok(BatchReport {
                batch_id,
                total,
                completed: Vec::new(),
            });
        }

        info!("开始传输批次 {}: {} 个文件", batch_id, total);

        let transfer_one = Arc::new(transfer_one);
        let semaphore =
            (self.max_concurrent > 0).then(|| Arc::new(Semaphore::new(self.max_concurrent)));

        let mut pending: FuturesUnordered<_> = tasks
            .into_iter()
            .map(|task| {
                let transfer_one = transfer_one.clone();
                let semaphore = semaphore.clone();
                let path = task.path.clone();
                let handle = tokio::spawn(async move {
                    let _permit = match semaphore {
                        Some(s) => Some(s.acquire_owned().await.map_err(|e| {
                            SyncError::Task(format!("transfer limiter closed: {}", e))
                        })?),
                        None => None,
                    };
                    transfer_one(task).await
                });
                async move { (path, handle.await) }
            })
            .collect();

        let mut completed = Vec::with_capacity(total);

        while let Some((path, joined)) = pending.next().await {
            let result = joined.map_err(SyncError::from).and_then(|r| r);

            Self::send_progress(
                &progress_tx,
                TransferProgress {
                    path: path.clone(),
                    completed_count: completed.len() + 1,
                    total_count: total,
                },
            );

            match result {
                Ok(()) => {
                    debug!("传输完成 ({}/{}): {}", completed.len() + 1, total, path);
                    completed.push(path);
                }
                Err(e) => {
                    warn!(
                        "批次 {} 失败 ({}/{} 已完成): {}",
                        batch_id,
                        completed.len(),
                        total,
                        e
                    );
                    // 丢弃 pending 只会分离仍在运行的任务，不会中止它们
                    return Err(match e {
                        e @ SyncError::Transfer { .. } => e,
                        other => SyncError::transfer(path, other),
                    });
                }
            }
        }

        info!("批次 {} 完成: {} 个文件", batch_id, total);

        Ok(BatchReport {
            batch_id,
            total,
            completed,
        })
    }

    /// 发送进度（接收端已关闭时忽略）
    fn send_progress(
        progress_tx: &Option<mpsc::UnboundedSender<TransferProgress>>,
        progress: TransferProgress,
    ) {
        if let Some(tx) = progress_tx {
            let _ = tx.send(progress);
        }
    }
}

impl Default for TransferCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
