pub mod consumer;
pub mod sync;

/// 公共API的prelude模块
/// 用户可以通过 `use app::prelude::*` 来导入最常用的类型
pub mod prelude {
    pub use crate::consumer::config::ConsumerConfig;
    pub use crate::consumer::ConsoleConsumer;
    pub use crate::consumer::Consumer;
    pub use crate::consumer::ConsumerManager;
    pub use crate::consumer::LogConsumer;
    pub use crate::sync::{
        ExecutorSettings, ScratchSpace, SyncExecutor, SyncMessage, SyncOrchestrator, SyncPlan,
        SyncPlanner, SyncResult, SyncState,
    };
}
