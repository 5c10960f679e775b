use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use storage::StorageError;

/// 失败分类，用于诊断输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    NotFound,
    Transfer,
    Permission,
    Cancelled,
    Config,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Connection => "connection",
            FailureKind::NotFound => "not found",
            FailureKind::Transfer => "transfer",
            FailureKind::Permission => "permission",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// 单个文件同步失败的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl From<&StorageError> for TransferFailure {
    fn from(err: &StorageError) -> Self {
        let kind = match err {
            StorageError::ConnectionError(_) => FailureKind::Connection,
            StorageError::NotFoundError(_) => FailureKind::NotFound,
            StorageError::TransferError(_) => FailureKind::Transfer,
            StorageError::PermissionError(_) => FailureKind::Permission,
            StorageError::Cancelled(_) => FailureKind::Cancelled,
            StorageError::ConfigError(_) | StorageError::UnsupportedType(_) => FailureKind::Config,
        };
        Self {
            kind,
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.reason)
    }
}

/// Outcome of one sync run.
///
/// `succeeded` and `failed` together hold exactly the paths the plan marked
/// for copying; `skipped` holds the rest. All three are keyed by path, so the
/// order in which concurrent workers finish does not matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeMap<String, TransferFailure>,
    pub skipped: BTreeSet<String>,
    pub bytes_transferred: u64,
}

impl SyncResult {
    pub fn record_success(&mut self, path: &str, bytes: u64) {
        self.failed.remove(path);
        self.succeeded.insert(path.to_string());
        self.bytes_transferred += bytes;
    }

    pub fn record_failure(&mut self, path: &str, failure: TransferFailure) {
        if !self.succeeded.contains(path) {
            self.failed.insert(path.to_string(), failure);
        }
    }

    pub fn record_skip(&mut self, path: &str) {
        self.skipped.insert(path.to_string());
    }

    /// 是否已有该路径的成功或失败记录
    pub fn is_settled(&self, path: &str) -> bool {
        self.succeeded.contains(path) || self.failed.contains_key(path)
    }

    /// Number of copy tasks that were attempted (or cancelled).
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// 以JSON格式导出，供 `--report` 使用
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Paths whose failure was a permission problem.
    pub fn permission_failures(&self) -> impl Iterator<Item = &str> {
        self.failed
            .iter()
            .filter(|(_, f)| f.kind == FailureKind::Permission)
            .map(|(path, _)| path.as_str())
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped",
            self.succeeded.len(),
            self.failed.len(),
            self.skipped.len()
        )
    }
}
