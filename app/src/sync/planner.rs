use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use storage::FileRecord;

/// 单个文件的处理动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferAction {
    Copy,
    Skip,
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferAction::Copy => f.write_str("COPY"),
            TransferAction::Skip => f.write_str("SKIP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferTask {
    pub path: String,
    pub action: TransferAction,
    /// 人类可读的决策原因
    pub reason: String,
}

impl TransferTask {
    pub fn copy(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: TransferAction::Copy,
            reason: reason.into(),
        }
    }

    pub fn skip(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: TransferAction::Skip,
            reason: reason.into(),
        }
    }

    pub fn is_copy(&self) -> bool {
        self.action == TransferAction::Copy
    }
}

/// Ordered, read-only list of transfer decisions.
///
/// Holds exactly one task per distinct source path, in source listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    tasks: Vec<TransferTask>,
}

impl SyncPlan {
    pub fn tasks(&self) -> &[TransferTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn copies(&self) -> impl Iterator<Item = &TransferTask> {
        self.tasks.iter().filter(|t| t.is_copy())
    }

    pub fn copy_count(&self) -> usize {
        self.copies().count()
    }

    pub fn skip_count(&self) -> usize {
        self.tasks.len() - self.copy_count()
    }

    pub fn get(&self, path: &str) -> Option<&TransferTask> {
        self.tasks.iter().find(|t| t.path == path)
    }

    /// 预演报告
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for task in &self.tasks {
            writeln!(f, "  {}  {}  ({})", task.action, task.path, task.reason)?;
        }
        write!(
            f,
            "{} to copy, {} up to date",
            self.copy_count(),
            self.skip_count()
        )
    }
}

/// 根据源和目标的文件元数据生成同步计划
pub struct SyncPlanner;

impl SyncPlanner {
    /// Decide, for every source file, whether it must be copied.
    ///
    /// A file is copied when the destination has no record for it or when the
    /// source modification time is strictly later than the destination's.
    /// Equal timestamps are treated as up to date. Sizes are never compared.
    pub fn plan(source: &[FileRecord], destination: &HashMap<String, FileRecord>) -> SyncPlan {
        let mut seen = HashSet::with_capacity(source.len());
        let mut tasks = Vec::with_capacity(source.len());

        for record in source {
            if !seen.insert(record.path.as_str()) {
                log::warn!("Duplicate source path ignored: {}", record.path);
                continue;
            }

            let task = match destination.get(&record.path).filter(|d| !d.is_absent()) {
                None => TransferTask::copy(&record.path, "missing at destination"),
                Some(existing) if record.is_newer_than(existing) => TransferTask::copy(
                    &record.path,
                    format!(
                        "source newer ({} > {})",
                        format_time(record.modified),
                        format_time(existing.modified)
                    ),
                ),
                Some(_) => TransferTask::skip(&record.path, "destination up to date"),
            };

            log::debug!("Planned {} {}: {}", task.action, task.path, task.reason);
            tasks.push(task);
        }

        SyncPlan { tasks }
    }

    /// 以路径为键建立目标端索引
    pub fn index(records: Vec<FileRecord>) -> HashMap<String, FileRecord> {
        records
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect()
    }
}

fn format_time(secs: Option<i64>) -> String {
    secs.map_or_else(|| "none".to_string(), |s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(records: &[FileRecord]) -> HashMap<String, FileRecord> {
        SyncPlanner::index(records.to_vec())
    }

    #[test]
    fn missing_and_newer_are_copied() {
        let source = vec![
            FileRecord::new("a.txt", 10, 200),
            FileRecord::new("b.txt", 20, 100),
        ];
        let destination = index(&[FileRecord::new("a.txt", 10, 150)]);

        let plan = SyncPlanner::plan(&source, &destination);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.tasks()[0].path, "a.txt");
        assert_eq!(plan.tasks()[0].action, TransferAction::Copy);
        assert_eq!(plan.tasks()[0].reason, "source newer (200 > 150)");
        assert_eq!(plan.tasks()[1].path, "b.txt");
        assert_eq!(plan.tasks()[1].action, TransferAction::Copy);
        assert_eq!(plan.tasks()[1].reason, "missing at destination");
    }

    #[test]
    fn planning_is_deterministic() {
        let source = vec![
            FileRecord::new("z.log", 5, 300),
            FileRecord::new("a.txt", 100, 100),
            FileRecord::new("b.txt", 50, 40),
            FileRecord::new("m/n.csv", 7, 70),
        ];
        let destination = index(&[
            FileRecord::new("a.txt", 100, 90),
            FileRecord::new("m/n.csv", 7, 70),
            FileRecord::new("z.log", 5, 301),
        ]);

        let first = SyncPlanner::plan(&source, &destination);
        let second = SyncPlanner::plan(&source, &destination);
        assert_eq!(first, second);

        let decisions: Vec<(&str, TransferAction)> = first
            .tasks()
            .iter()
            .map(|t| (t.path.as_str(), t.action))
            .collect();
        assert_eq!(
            decisions,
            vec![
                ("z.log", TransferAction::Skip),
                ("a.txt", TransferAction::Copy),
                ("b.txt", TransferAction::Copy),
                ("m/n.csv", TransferAction::Skip),
            ]
        );
    }

    #[test]
    fn newer_source_and_unknown_destination_both_copy() {
        let source = vec![FileRecord::new("a.txt", 1, 100), FileRecord::new("b.txt", 1, 50)];
        let destination = index(&[FileRecord::new("a.txt", 1, 90)]);

        let plan = SyncPlanner::plan(&source, &destination);

        assert_eq!(plan.copy_count(), 2);
        assert_eq!(plan.tasks()[0].reason, "source newer (100 > 90)");
        assert_eq!(plan.tasks()[1].reason, "missing at destination");
    }

    #[test]
    fn plan_exports_json() {
        let plan = SyncPlanner::plan(&[FileRecord::new("a.txt", 1, 1)], &HashMap::new());

        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(json["tasks"][0]["path"], "a.txt");
        assert_eq!(json["tasks"][0]["action"], "copy");
        assert_eq!(json["tasks"][0]["reason"], "missing at destination");
    }

    #[test]
    fn equal_or_older_is_skipped() {
        let source = vec![
            FileRecord::new("same.txt", 1, 100),
            FileRecord::new("older.txt", 1, 50),
        ];
        let destination = index(&[
            FileRecord::new("same.txt", 999, 100),
            FileRecord::new("older.txt", 1, 60),
        ]);

        let plan = SyncPlanner::plan(&source, &destination);

        assert_eq!(plan.copy_count(), 0);
        assert_eq!(plan.skip_count(), 2);
        assert!(plan
            .tasks()
            .iter()
            .all(|t| t.reason == "destination up to date"));
    }

    #[test]
    fn absent_destination_record_means_copy() {
        let source = vec![FileRecord::new("x.bin", 4, 10)];
        let destination = index(&[FileRecord::absent("x.bin")]);

        let plan = SyncPlanner::plan(&source, &destination);
        assert_eq!(plan.get("x.bin").unwrap().action, TransferAction::Copy);
    }

    #[test]
    fn duplicate_source_paths_are_planned_once() {
        let source = vec![
            FileRecord::new("dup.txt", 1, 10),
            FileRecord::new("other.txt", 1, 10),
            FileRecord::new("dup.txt", 1, 99),
        ];

        let plan = SyncPlanner::plan(&source, &HashMap::new());

        let paths: Vec<&str> = plan.tasks().iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, vec!["dup.txt", "other.txt"]);
    }

    #[test]
    fn empty_source_gives_empty_plan() {
        let destination = index(&[FileRecord::new("only-here.txt", 1, 1)]);
        let plan = SyncPlanner::plan(&[], &destination);
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "0 to copy, 0 up to date");
    }

    #[test]
    fn destination_only_files_are_ignored() {
        let source = vec![FileRecord::new("a.txt", 1, 1)];
        let destination = index(&[
            FileRecord::new("a.txt", 1, 1),
            FileRecord::new("stale.txt", 1, 1),
        ]);

        let plan = SyncPlanner::plan(&source, &destination);
        assert_eq!(plan.len(), 1);
        assert!(plan.get("stale.txt").is_none());
    }
}
