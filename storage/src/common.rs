use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// 列举时获取的文件快照，本地存储和S3统一使用
///
/// `modified` 为秒级Unix时间戳；`None` 表示路径不存在，
/// 比任何实际时间都早（Option 的排序中 None < Some）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// 相对于存储根目录的路径，使用 / 分隔
    pub path: String,
    /// 文件大小（字节）
    pub size: u64,
    /// 最后修改时间（秒）
    pub modified: Option<i64>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, size: u64, modified: i64) -> Self {
        Self {
            path: path.into(),
            size,
            modified: Some(modified),
        }
    }

    /// 不存在路径的哨兵记录：大小为0，修改时间为负无穷
    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            modified: None,
        }
    }

    pub fn from_system_time(path: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self::new(path, size, epoch_secs(modified))
    }

    pub fn is_absent(&self) -> bool {
        self.modified.is_none()
    }

    /// 源端是否比目标端新；相等时返回false
    pub fn is_newer_than(&self, other: &FileRecord) -> bool {
        self.modified > other.modified
    }
}

impl fmt::Display for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modified {
            Some(secs) => {
                let stamp = chrono::DateTime::from_timestamp(secs, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| secs.to_string());
                write!(f, "{} ({} bytes, modified {})", self.path, self.size, stamp)
            }
            None => write!(f, "{} (absent)", self.path),
        }
    }
}

/// SystemTime 转为秒级时间戳，早于1970的时间返回负数
pub fn epoch_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64) - i64::from(e.duration().subsec_nanos() > 0),
    }
}

/// 统一路径分隔符并去掉开头的 /
pub fn normalize_key(key: &str) -> String {
    key.replace('\\', "/").trim_start_matches('/').to_string()
}

/// 规范化前缀：非空时保证以 / 结尾
pub fn normalize_prefix(prefix: &str) -> String {
    let prefix = normalize_key(prefix);
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix
    } else {
        format!("{}/", prefix)
    }
}
