use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use storage::ByteReader;

const SCRATCH_PREFIX: &str = "datasync-";
const SCRATCH_SUFFIX: &str = ".scratch";

/// 传输中转目录
///
/// 每次传输在此分配一个临时文件，文件在 [`ScratchFile`] 被丢弃时删除，
/// 无论传输成功、失败还是panic。
#[derive(Debug)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Scratch space under the system temp directory.
    pub fn in_temp_dir() -> io::Result<Self> {
        Self::new(std::env::temp_dir().join("datasync"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn acquire(&self) -> io::Result<ScratchFile> {
        let named = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(SCRATCH_SUFFIX)
            .tempfile_in(&self.root)?;
        let (file, path) = named.into_parts();

        Ok(ScratchFile {
            file: tokio::fs::File::from_std(file),
            path,
            len: 0,
        })
    }

    /// 当前残留的中转文件数量
    pub fn outstanding(&self) -> io::Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(SCRATCH_PREFIX) && name.ends_with(SCRATCH_SUFFIX) {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// A staged copy of one file's content.
pub struct ScratchFile {
    // 先关闭句柄，再删除路径
    file: tokio::fs::File,
    path: TempPath,
    len: u64,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drain `reader` into the scratch file.
    pub async fn fill(&mut self, reader: &mut ByteReader) -> io::Result<u64> {
        let copied = tokio::io::copy(reader, &mut self.file).await?;
        self.file.flush().await?;
        self.len += copied;
        Ok(copied)
    }

    /// 打开一个新的只读句柄，从头读取暂存内容
    pub async fn reader(&self) -> io::Result<ByteReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::pin(file))
    }
}
