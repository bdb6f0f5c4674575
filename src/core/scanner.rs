//! 本地文件扫描 - 遍历项目目录并为每个文件计算内容 hash

use crate::core::hasher::calculate_hash;
use crate::error::{Result, SyncError};
use crate::storage::{normalize_path, FileEntry, FileTree};
use futures::{StreamExt, TryStreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 依赖缓存目录，任意层级都不扫描
pub const DEPENDENCY_DIR: &str = "node_modules";
/// 同步系统自身使用的本地元数据文件，永不传输
pub const LOCAL_PROPERTIES_FILE: &str = "/.monaca/local_properties.json";

/// 文件扫描器配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 不进入的目录名
    pub excluded_dirs: Vec<String>,
    /// 扫描结束后移除的路径
    pub reserved_files: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: vec![DEPENDENCY_DIR.to_string()],
            reserved_files: vec![LOCAL_PROPERTIES_FILE.to_string()],
        }
    }
}

/// 本地文件扫描器
pub struct FileScanner {
    max_concurrent: usize,
    config: ScanConfig,
}

impl FileScanner {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(max_concurrent: usize, config: ScanConfig) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            config,
        }
    }

    /// 扫描本地目录并返回文件树（文件附带内容 hash）
    pub async fn scan(&self, root: &Path) -> Result<FileTree> {
        let root_display = root.display().to_string();
        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(SyncError::io(
                    root_display,
                    io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
                ))
            }
            Err(e) => return Err(SyncError::io(root_display, e)),
        }

        info!("开始扫描本地目录: {}", root_display);

        // 使用 spawn_blocking 避免阻塞 async runtime
        let base = root.to_path_buf();
        let excluded = self.config.excluded_dirs.clone();
        let (dirs, files) =
            tokio::task::spawn_blocking(move || Self::walk(&base, &excluded)).await??;

        let mut tree = FileTree::new();
        for path in dirs {
            tree.insert(path.clone(), FileEntry::dir(path));
        }

        let hashed: Vec<FileEntry> = futures::stream::iter(files)
            .map(|(path, full_path)| async move {
                let data = tokio::fs::read(&full_path)
                    .await
                    .map_err(|e| SyncError::io(path.as_str(), e))?;
                Ok::<_, SyncError>(FileEntry::file(path, calculate_hash(&data)))
            })
            .buffer_unordered(self.max_concurrent)
            .try_collect()
            .await?;

        for entry in hashed {
            tree.insert(entry.path.clone(), entry);
        }

        for reserved in &self.config.reserved_files {
            if tree.remove(reserved).is_some() {
                debug!("排除本地元数据文件: {}", reserved);
            }
        }

        let dir_count = tree.values().filter(|e| e.is_dir()).count();
        info!(
            "扫描完成: {} 个文件, {} 个目录",
            tree.len() - dir_count,
            dir_count
        );

        Ok(tree)
    }

    /// 遍历目录，返回 (目录路径, [(文件路径, 本地路径)])
    fn walk(base: &Path, excluded: &[String]) -> Result<(Vec<String>, Vec<(String, PathBuf)>)> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(base)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && excluded
                        .iter()
                        .any(|name| e.file_name().to_str() == Some(name.as_str())))
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| base.display().to_string());
                SyncError::io(path, e.into())
            })?;

            let relative = match entry.path().strip_prefix(base) {
                Ok(p) => match p.to_str() {
                    Some(p) => p.to_string(),
                    None => {
                        // 无法表示为项目路径，也就无法再按路径读取
                        warn!("跳过非 UTF-8 文件名: {}", p.display());
                        continue;
                    }
                },
                Err(_) => continue,
            };
            let path = normalize_path(&relative);

            let file_type = entry.file_type();
            if file_type.is_dir() {
                dirs.push(path);
            } else if file_type.is_file() {
                files.push((path, entry.into_path()));
            } else {
                debug!("跳过非常规文件: {}", path);
            }
        }

        Ok((dirs, files))
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new(8)
    }
}
