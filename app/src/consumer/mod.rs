use tokio::sync::broadcast;
use utils::error::Result;

use crate::sync::SyncMessage;

pub mod config;
pub mod console;
pub mod log;
pub mod manager;
pub mod stats;

pub use console::ConsoleConsumer;
pub use self::log::LogConsumer;
pub use manager::ConsumerManager;
pub use stats::SyncStats;

/// 消费者 trait - 定义消费者接口
#[async_trait::async_trait]
pub trait Consumer: Send + Sync {
    /// 启动消费者
    async fn start(
        &mut self, receiver: broadcast::Receiver<SyncMessage>,
    ) -> Result<tokio::task::JoinHandle<Result<()>>>;

    /// 获取消费者名称
    fn name(&self) -> &'static str;
}
