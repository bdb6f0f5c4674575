//! 同步引擎 - 扫描、比较并批量传输项目文件

use crate::core::comparator::{diff_trees, filter_upload_scope};
use crate::core::scanner::{FileScanner, LOCAL_PROPERTIES_FILE};
use crate::core::transfer::{TransferCoordinator, TransferDirection, TransferProgress, TransferTask};
use crate::error::{Result, SyncError};
use crate::storage::{FileTree, LocalProject, RemoteTreeClient};
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 最大并发传输数，0 表示不限制
    pub max_concurrent_transfers: usize,
    /// 扫描时并发读取文件数
    pub max_concurrent_reads: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 0,
            max_concurrent_reads: 8,
        }
    }
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub project_id: String,
    pub direction: TransferDirection,
    pub start_time: i64,
    pub end_time: i64,
    /// 本地扫描到的条目数
    pub files_scanned: usize,
    /// 远程文件树条目数
    pub remote_files: usize,
    /// 已传输（dry run 时为将要传输）的文件
    pub files: Vec<String>,
    pub dry_run: bool,
    /// 耗时（毫秒）
    pub duration: u64,
}

/// 同步引擎：扫描、比较、批量传输
pub struct SyncEngine {
    remote: Arc<dyn RemoteTreeClient>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteTreeClient>) -> Self {
        Self {
            remote,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(remote: Arc<dyn RemoteTreeClient>, config: SyncConfig) -> Self {
        Self { remote, config }
    }

    /// 上传本地修改到远程项目
    pub async fn upload_project(
        &self,
        project_id: &str,
        local_dir: &Path,
        progress_tx: Option<mpsc::UnboundedSender<TransferProgress>>,
    ) -> Result<SyncReport> {
        self.run(project_id, local_dir, TransferDirection::Upload, false, progress_tx)
            .await
    }

    /// 下载远程修改到本地目录
    pub async fn download_project(
        &self,
        project_id: &str,
        local_dir: &Path,
        progress_tx: Option<mpsc::UnboundedSender<TransferProgress>>,
    ) -> Result<SyncReport> {
        self.run(project_id, local_dir, TransferDirection::Download, false, progress_tx)
            .await
    }

    /// 只计算需要传输的文件，不执行传输
    pub async fn check_modified(
        &self,
        project_id: &str,
        local_dir: &Path,
        direction: TransferDirection,
    ) -> Result<SyncReport> {
        self.run(project_id, local_dir, direction, true, None).await
    }

    async fn run(
        &self,
        project_id: &str,
        local_dir: &Path,
        direction: TransferDirection,
        dry_run: bool,
        progress_tx: Option<mpsc::UnboundedSender<TransferProgress>>,
    ) -> Result<SyncReport> {
        let start_time = chrono::Utc::now().timestamp();
        let started = Instant::now();

        info!(
            "开始同步: project={}, direction={}, local={}, remote={}, dry_run={}",
            project_id,
            direction,
            local_dir.display(),
            self.remote.name(),
            dry_run
        );

        // 每次同步只扫描一次；扫描或获取失败时不开始任何传输
        let scanner = FileScanner::new(self.config.max_concurrent_reads);
        let (local_tree, remote_tree) =
            tokio::try_join!(scanner.scan(local_dir), self.remote.get_tree(project_id))?;

        let transfer_set = Self::transfer_set(&local_tree, &remote_tree, direction);
        debug!(
            "比较完成: 本地 {} 项, 远程 {} 项, 需要{} {} 个文件",
            local_tree.len(),
            remote_tree.len(),
            if direction == TransferDirection::Upload { "上传" } else { "下载" },
            transfer_set.len()
        );

        let tasks: Vec<TransferTask> = transfer_set
            .into_keys()
            .map(|path| TransferTask { path, direction })
            .collect();

        let files = if dry_run {
            tasks.into_iter().map(|t| t.path).collect()
        } else {
            let transfer = ProjectTransfer {
                project_id: project_id.to_string(),
                remote: self.remote.clone(),
                local: Arc::new(LocalProject::new(local_dir)),
            };
            let coordinator =
                TransferCoordinator::with_max_concurrent(self.config.max_concurrent_transfers);
            coordinator
                .run_batch(
                    tasks,
                    move |task| {
                        let transfer = transfer.clone();
                        async move { transfer.transfer(task).await }
                    },
                    progress_tx,
                )
                .await?
                .completed
        };

        let end_time = chrono::Utc::now().timestamp();
        info!(
            "同步完成: project={}, direction={}, {} 个文件",
            project_id,
            direction,
            files.len()
        );

        Ok(SyncReport {
            project_id: project_id.to_string(),
            direction,
            start_time,
            end_time,
            files_scanned: local_tree.len(),
            remote_files: remote_tree.len(),
            files,
            dry_run,
            duration: started.elapsed().as_millis() as u64,
        })
    }

    /// 按方向计算传输集合；上传额外应用范围过滤，本地元数据文件两个方向都不传输
    pub fn transfer_set(local: &FileTree, remote: &FileTree, direction: TransferDirection) -> FileTree {
        let mut set = match direction {
            TransferDirection::Upload => filter_upload_scope(diff_trees(local, remote)),
            TransferDirection::Download => diff_trees(remote, local),
        };
        set.remove(LOCAL_PROPERTIES_FILE);
        set
    }
}

/// 单文件传输，持有本批次共享的本地与远程端
#[derive(Clone)]
struct ProjectTransfer {
    project_id: String,
    remote: Arc<dyn RemoteTreeClient>,
    local: Arc<LocalProject>,
}

impl ProjectTransfer {
    async fn transfer(&self, task: TransferTask) -> Result<()> {
        let result = match task.direction {
            TransferDirection::Upload => self.upload(&task.path).await,
            TransferDirection::Download => self.download(&task.path).await,
        };
        result.map_err(|e| SyncError::transfer(task.path, e))
    }

    /// 先完整读取本地文件，再保存到远程
    async fn upload(&self, path: &str) -> Result<()> {
        let data = self.local.read(path).await?;
        debug!("上传: {} ({} 字节)", path, data.len());
        self.remote
            .save_file(&self.project_id, path, Bytes::from(data))
            .await
    }

    /// 先请求远程内容，再写入本地
    async fn download(&self, path: &str) -> Result<()> {
        let data = self.remote.read_file(&self.project_id, path).await?;
        debug!("下载: {} ({} 字节)", path, data.len());
        self.local.write(path, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::calculate_hash;
    use crate::core::transfer::progress_channel;
    use crate::storage::FileEntry;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;

    /// 内存中的远程项目
    #[derive(Default)]
    struct MemoryRemote {
        files: Mutex<HashMap<String, Vec<u8>>>,
        dirs: Vec<String>,
        fail_save: Option<String>,
        fail_tree: bool,
    }

    impl MemoryRemote {
        fn with_files(files: &[(&str, &str)]) -> Self {
            Self {
                files: Mutex::new(
                    files
                        .iter()
                        .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                        .collect(),
                ),
                ..Default::default()
            }
        }

        fn content(&self, path: &str) -> Option<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|d| String::from_utf8_lossy(d).to_string())
        }
    }

    #[async_trait]
    impl RemoteTreeClient for MemoryRemote {
        async fn get_tree(&self, _project_id: &str) -> Result<FileTree> {
            if self.fail_tree {
                return Err(SyncError::Remote {
                    status: 401,
                    message: Some("Unauthorized".to_string()),
                });
            }
            let mut tree: FileTree = self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(p, d)| (p.clone(), FileEntry::file(p.clone(), calculate_hash(d))))
                .collect();
            for dir in &self.dirs {
                tree.insert(dir.clone(), FileEntry::dir(dir.clone()));
            }
            Ok(tree)
        }

        async fn read_file(&self, _project_id: &str, path: &str) -> Result<Bytes> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|d| Bytes::from(d.clone()))
                .ok_or(SyncError::Remote {
                    status: 404,
                    message: None,
                })
        }

        async fn save_file(&self, _project_id: &str, path: &str, data: Bytes) -> Result<()> {
            if self.fail_save.as_deref() == Some(path) {
                return Err(SyncError::Network {
                    code: "timeout".to_string(),
                    message: "timed out".to_string(),
                });
            }
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), data.to_vec());
            Ok(())
        }

        fn name(&self) -> &str {
            "memory"
        }
    }

    fn local_project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path.trim_start_matches('/'));
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_upload_transfers_changed_files_in_scope() {
        let local = local_project(&[
            ("/config.xml", "<widget/>"),
            ("/www/index.html", "<html>new</html>"),
            ("/www/js/app.js", "same"),
            ("/.monaca/project_info.json", "{}"),
            ("/.monaca/local_properties.json", "{}"),
            ("/platforms/android/a.java", "class A {}"),
            ("/node_modules/x/index.js", "x"),
        ]);
        let remote = Arc::new(MemoryRemote::with_files(&[
            ("/www/index.html", "<html>old</html>"),
            ("/www/js/app.js", "same"),
        ]));
        let engine = SyncEngine::new(remote.clone());
        let (tx, rx) = progress_channel();

        let report = engine
            .upload_project("p1", local.path(), Some(tx))
            .await
            .unwrap();

        let mut uploaded = report.files.clone();
        uploaded.sort();
        assert_eq!(uploaded, vec!["/config.xml", "/www/index.html"]);
        assert_eq!(remote.content("/www/index.html").as_deref(), Some("<html>new</html>"));
        assert_eq!(remote.content("/.monaca/project_info.json"), None);
        assert_eq!(remote.content("/platforms/android/a.java"), None);

        let events: Vec<_> = rx.collect().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.total_count == 2));
    }

    #[tokio::test]
    async fn test_download_writes_missing_and_changed_files() {
        let local = local_project(&[("/www/index.html", "local"), ("/www/keep.js", "same")]);
        let mut remote = MemoryRemote::with_files(&[
            ("/www/index.html", "remote"),
            ("/www/keep.js", "same"),
            ("/www/css/deep/style.css", "body {}"),
            ("/.monaca/project_info.json", "{}"),
            ("/.monaca/local_properties.json", r#"{"remote":true}"#),
        ]);
        remote.dirs = vec!["/www".to_string(), "/www/css".to_string()];
        let engine = SyncEngine::new(Arc::new(remote));

        let report = engine
            .download_project("p1", local.path(), None)
            .await
            .unwrap();

        assert_eq!(report.files.len(), 3);
        let root = local.path();
        assert_eq!(fs::read_to_string(root.join("www/index.html")).unwrap(), "remote");
        assert_eq!(
            fs::read_to_string(root.join("www/css/deep/style.css")).unwrap(),
            "body {}"
        );
        // 下载不应用范围过滤，但不覆盖本地元数据文件
        assert!(root.join(".monaca/project_info.json").exists());
        assert!(!root.join(".monaca/local_properties.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_download_keeps_files_sharing_a_name_prefix() {
        let big = "x".repeat(200_000);
        for _ in 0..20 {
            let local = local_project(&[]);
            let remote =
                MemoryRemote::with_files(&[("/www/a", big.as_str()), ("/www/a.tmp", "ten bytes!")]);
            let engine = SyncEngine::new(Arc::new(remote));

            let report = engine
                .download_project("p1", local.path(), None)
                .await
                .unwrap();

            assert_eq!(report.files.len(), 2);
            let root = local.path();
            assert_eq!(fs::read_to_string(root.join("www/a")).unwrap().len(), 200_000);
            assert_eq!(fs::read_to_string(root.join("www/a.tmp")).unwrap(), "ten bytes!");
        }
    }

    #[tokio::test]
    async fn test_check_modified_does_not_transfer() {
        let local = local_project(&[("/www/index.html", "new")]);
        let remote = Arc::new(MemoryRemote::with_files(&[("/www/index.html", "old")]));
        let engine = SyncEngine::new(remote.clone());

        let report = engine
            .check_modified("p1", local.path(), TransferDirection::Upload)
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.files, vec!["/www/index.html"]);
        assert_eq!(remote.content("/www/index.html").as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_upload_failure_names_path() {
        let local = local_project(&[("/www/a.js", "a"), ("/www/b.js", "b")]);
        let remote = Arc::new(MemoryRemote {
            fail_save: Some("/www/b.js".to_string()),
            ..Default::default()
        });
        let engine = SyncEngine::new(remote);

        let err = engine
            .upload_project("p1", local.path(), None)
            .await
            .unwrap_err();

        match err {
            SyncError::Transfer { path, source } => {
                assert_eq!(path, "/www/b.js");
                assert!(matches!(*source, SyncError::Network { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scan_error_aborts_before_transfer() {
        let remote = Arc::new(MemoryRemote::with_files(&[("/www/a.js", "a")]));
        let engine = SyncEngine::new(remote);
        let missing = tempfile::tempdir().unwrap().path().join("gone");

        let err = engine
            .download_project("p1", &missing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_remote_tree_error_aborts() {
        let local = local_project(&[("/www/a.js", "a")]);
        let remote = Arc::new(MemoryRemote {
            fail_tree: true,
            ..Default::default()
        });

        let err = SyncEngine::new(remote)
            .upload_project("p1", local.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote { status: 401, .. }));
    }
}
