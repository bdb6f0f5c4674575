use crate::error::{Result, SyncError};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// 本地项目目录，负责单文件读写
pub struct LocalProject {
    base_path: PathBuf,
    name: String,
}

impl LocalProject {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let base_path = path.as_ref().to_path_buf();
        let name = format!("local:{}", base_path.display());
        Self { base_path, name }
    }

    pub fn root(&self) -> &Path {
        &self.base_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 项目路径 -> 本地路径，拒绝跳出项目根目录的路径
    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/').trim_start_matches('\\'));

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(SyncError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path escapes project root"),
            ));
        }

        Ok(self.base_path.join(relative))
    }

    /// 读取整个文件
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path)?;
        fs::read(&full_path)
            .await
            .map_err(|e| SyncError::io(path, e))
    }

    /// 写入整个文件，父目录不存在时自动创建
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve_path(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(path, e))?;
        }

        // 先写临时文件再重命名，临时名带随机后缀
        let mut temp_name = std::ffi::OsString::from(".");
        temp_name.push(full_path.file_name().unwrap_or_default());
        temp_name.push(format!(".{}.part", uuid::Uuid::new_v4().simple()));
        let temp_path = full_path.with_file_name(temp_name);

        let written = match fs::write(&temp_path, data).await {
            Ok(()) => fs::rename(&temp_path, &full_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(SyncError::io(path, e));
        }

        Ok(())
    }
}
