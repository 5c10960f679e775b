use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs as tokio_fs;
use tokio::io::AsyncWriteExt;

use crate::common::{normalize_key, FileRecord};
use crate::error::{Result, StorageError};
use crate::{ByteReader, StorageProvider};

/// Prefix of in-flight staging files; listings never report them.
pub const STAGING_PREFIX: &str = ".datasync-";

/// Local storage implementation with async support
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create new local storage instance
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get full path for a key, rejecting keys that leave the root
    pub fn full_path(&self, key: &str) -> Result<PathBuf> {
        let key = normalize_key(key);
        let relative = Path::new(&key);

        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StorageError::PermissionError(format!(
                "path '{}' escapes storage root {}",
                key,
                self.root.display()
            )));
        }

        Ok(self.root.join(relative))
    }

    /// Convert an absolute path under the root into a record path
    fn record_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// 使用walkdir在阻塞线程中递归遍历，只返回普通文件
    fn walk_files(root: PathBuf, start: PathBuf) -> io::Result<Vec<(PathBuf, std::fs::Metadata)>> {
        use walkdir::WalkDir;

        let walker = WalkDir::new(&start)
            .follow_links(false) // 不跟随符号链接，避免循环
            .max_open(100) // 限制同时打开的文件句柄数
            .sort_by_file_name();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // 根目录本身不可读时直接失败，子项错误只记录
                    if e.path() == Some(start.as_path()) {
                        return Err(e.into());
                    }
                    log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(STAGING_PREFIX)
            {
                continue;
            }

            let metadata = entry.metadata().map_err(io::Error::from)?;
            files.push((entry.into_path(), metadata));
        }

        Ok(files)
    }
}

#[async_trait::async_trait]
impl StorageProvider for LocalStorage {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn connect(&self) -> Result<()> {
        tokio_fs::create_dir_all(&self.root).await.map_err(|e| {
            StorageError::ConnectionError(format!(
                "cannot open local root {}: {}",
                self.root.display(),
                e
            ))
        })?;
        log::debug!("Local storage ready at {}", self.root.display());
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn list(&self, prefix: &str) -> Result<Vec<FileRecord>> {
        let start = self.full_path(prefix)?;

        // 前缀不存在时为空列表，无法访问则报错
        match tokio_fs::try_exists(&start).await {
            Ok(true) => {}
            Ok(false) => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::from_io(format!("list {}", start.display()), e)),
        }

        let root = self.root.clone();
        let walk_start = start.clone();
        let files = tokio::task::spawn_blocking(move || Self::walk_files(root, walk_start))
            .await
            .map_err(|e| StorageError::TransferError(format!("listing task failed: {}", e)))?
            .map_err(|e| StorageError::from_io(format!("list {}", start.display()), e))?;

        let records = files
            .into_iter()
            .filter_map(|(path, metadata)| {
                let record_path = self.record_path(&path)?;
                let modified = metadata.modified().ok()?;
                Some(FileRecord::from_system_time(
                    record_path,
                    metadata.len(),
                    modified,
                ))
            })
            .collect();

        Ok(records)
    }

    async fn stat(&self, path: &str) -> Result<FileRecord> {
        let full_path = self.full_path(path)?;
        let key = normalize_key(path);

        match tokio_fs::metadata(&full_path).await {
            Ok(metadata) if metadata.is_file() => {
                let modified = metadata
                    .modified()
                    .map_err(|e| StorageError::from_io(format!("stat {}", key), e))?;
                Ok(FileRecord::from_system_time(key, metadata.len(), modified))
            }
            Ok(_) => Ok(FileRecord::absent(key)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileRecord::absent(key)),
            Err(e) => Err(StorageError::from_io(format!("stat {}", key), e)),
        }
    }

    async fn read(&self, path: &str) -> Result<ByteReader> {
        let full_path = self.full_path(path)?;
        let file = tokio_fs::File::open(&full_path)
            .await
            .map_err(|e| StorageError::from_io(format!("read {}", normalize_key(path)), e))?;

        Ok(Box::pin(file))
    }

    async fn write(&self, path: &str, mut data: ByteReader) -> Result<u64> {
        let target = self.full_path(path)?;
        let key = normalize_key(path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        // Create parent directories if needed
        tokio_fs::create_dir_all(&parent)
            .await
            .map_err(|e| StorageError::from_io(format!("create parent of {}", key), e))?;

        // 先写入同目录下的临时文件，完成后原子重命名
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".part")
            .tempfile_in(&parent)
            .map_err(|e| StorageError::from_io(format!("stage {}", key), e))?;
        let (file, staging_path) = staging.into_parts();
        let mut file = tokio_fs::File::from_std(file);

        let written = tokio::io::copy(&mut data, &mut file)
            .await
            .map_err(|e| StorageError::from_io(format!("write {}", key), e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::from_io(format!("flush {}", key), e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::from_io(format!("sync {}", key), e))?;
        drop(file);

        staging_path
            .persist(&target)
            .map_err(|e| StorageError::from_io(format!("commit {}", key), e.error))?;

        Ok(written)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        match tokio_fs::remove_file(&full_path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(
                format!("delete {}", normalize_key(path)),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_path_rejects_escaping_keys() {
        let storage = LocalStorage::new("/srv/root");

        assert_eq!(
            storage.full_path("a/b.txt").unwrap(),
            PathBuf::from("/srv/root/a/b.txt")
        );
        assert_eq!(
            storage.full_path("/a/b.txt").unwrap(),
            PathBuf::from("/srv/root/a/b.txt")
        );
        assert!(matches!(
            storage.full_path("../etc/passwd"),
            Err(StorageError::PermissionError(_))
        ));
        assert!(matches!(
            storage.full_path("a/../../b"),
            Err(StorageError::PermissionError(_))
        ));
    }

    #[tokio::test]
    async fn list_reports_inaccessible_prefix() {
        let dir = tempfile::TempDir::new().unwrap();
        let not_a_dir = dir.path().join("plain.txt");
        std::fs::write(&not_a_dir, b"x").unwrap();

        // 根是普通文件，其下的前缀无法访问而不是不存在
        let storage = LocalStorage::new(&not_a_dir);
        let err = storage.list("reports").await.unwrap_err();
        assert!(matches!(err, StorageError::TransferError(_)));

        let storage = LocalStorage::new(dir.path());
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }

    #[test]
    fn record_path_uses_forward_slashes() {
        let storage = LocalStorage::new("/srv/root");
        let path = Path::new("/srv/root").join("dir").join("file.txt");
        assert_eq!(storage.record_path(&path).as_deref(), Some("dir/file.txt"));
    }
}
