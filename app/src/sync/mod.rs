//! 同步模块 - 规划、执行并编排单向文件同步

pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod result;
pub mod scratch;

pub use executor::{ExecutorSettings, SyncExecutor};
pub use orchestrator::{SyncOrchestrator, SyncState};
pub use planner::{SyncPlan, SyncPlanner, TransferAction, TransferTask};
pub use result::{FailureKind, SyncResult, TransferFailure};
pub use scratch::{ScratchFile, ScratchSpace};

/// 同步过程中广播给消费者的事件
#[derive(Debug, Clone)]
pub enum SyncMessage {
    /// 开始同步：源和目标的描述
    Started { source: String, destination: String },
    /// 计划生成完毕
    Planned { copy: usize, skip: usize },
    Transferred { path: String, bytes: u64 },
    Skipped { path: String, reason: String },
    Failed { path: String, failure: TransferFailure },
    /// 同步结束，携带最终结果
    Complete(SyncResult),
    /// 通知消费者退出（同步未完成时使用）
    Shutdown,
}
