use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use utils::app_config::{AppConfig, LogConfig};

use crate::sync::SyncResult;

/// 同步统计结构体 - 控制台输出的汇总信息
#[derive(Debug, Clone, Serialize)]
pub struct SyncStats {
    // 计划
    pub planned_copies: usize,
    pub planned_skips: usize,

    // 执行结果
    pub copied: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_bytes: u64, // 已传输字节数

    /// 失败的路径及原因
    pub failures: Vec<(String, String)>,

    // 显示相关元数据
    pub source: String,
    pub destination: String,
    pub log_path: String,
    pub total_time: String,
}

impl SyncStats {
    /// 构建日志文件路径（与日志配置一致）
    pub fn build_log_path() -> String {
        let log_dir = AppConfig::get::<LogConfig>("log")
            .ok()
            .and_then(|c| c.dir)
            .map(PathBuf::from);
        utils::logger::log_file_path(log_dir)
            .map(|path| path.to_string_lossy().to_string())
            .unwrap_or_else(|_| "datasync.log".to_string())
    }

    /// 用最终结果覆盖增量统计（广播可能丢消息）
    pub fn apply_result(&mut self, result: &SyncResult) {
        self.copied = result.succeeded.len();
        self.failed = result.failed.len();
        self.skipped = result.skipped.len();
        self.total_bytes = result.bytes_transferred;
        self.failures = result
            .failed
            .iter()
            .map(|(path, failure)| (path.clone(), failure.to_string()))
            .collect();
    }

    pub fn processed(&self) -> usize {
        self.copied + self.failed + self.skipped
    }
}

impl Default for SyncStats {
    fn default() -> Self {
        Self {
            planned_copies: 0,
            planned_skips: 0,
            copied: 0,
            failed: 0,
            skipped: 0,
            total_bytes: 0,
            failures: Vec::new(),
            source: String::from("unknown"),
            destination: String::from("unknown"),
            log_path: String::new(),
            total_time: String::from("0s"),
        }
    }
}

// 格式化字节大小
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{:.0} {}", size, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let avg_file_size = if self.copied > 0 {
            self.total_bytes as f64 / self.copied as f64
        } else {
            0.0
        };

        writeln!(
            f,
            " =================================================================="
        )?;
        writeln!(
            f,
            "                           Sync Statistics                          "
        )?;
        writeln!(
            f,
            " =================================================================="
        )?;
        writeln!(f)?;
        writeln!(f, "   Source      :    {}", self.source)?;
        writeln!(f, "   Destination :    {}", self.destination)?;
        writeln!(f, "   Total time  :    {}", self.total_time)?;
        writeln!(f, "   Log Path    :    {}", self.log_path)?;
        writeln!(f)?;
        writeln!(
            f,
            " ----------------------------- Plan -----------------------------"
        )?;
        writeln!(
            f,
            "   To copy:                                     {}",
            self.planned_copies
        )?;
        writeln!(
            f,
            "   Up to date:                                  {}",
            self.planned_skips
        )?;
        writeln!(
            f,
            " ---------------------------- Result ----------------------------"
        )?;
        writeln!(
            f,
            "   Copied:                                      {}",
            self.copied
        )?;
        writeln!(
            f,
            "   Failed:                                      {}",
            self.failed
        )?;
        writeln!(
            f,
            "   Skipped:                                     {}",
            self.skipped
        )?;
        writeln!(
            f,
            " --------------------------- Capacity ---------------------------"
        )?;
        writeln!(
            f,
            "   Transferred:                           {}",
            format_bytes(self.total_bytes as f64)
        )?;
        writeln!(
            f,
            "   Average:                               {}",
            format_bytes(avg_file_size)
        )?;

        if !self.failures.is_empty() {
            writeln!(
                f,
                " --------------------------- Failures ---------------------------"
            )?;
            for (path, reason) in &self.failures {
                writeln!(f, "   {}: {}", path, reason)?;
            }
        }

        writeln!(
            f,
            " -------------------------------------------------------------"
        )?;
        writeln!(
            f,
            " ================================================================="
        )
    }
}
