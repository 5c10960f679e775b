use tokio::sync::broadcast;
use utils::error::Result;

use crate::consumer::config::ConsumerConfig;
use crate::consumer::{ConsoleConsumer, Consumer, LogConsumer};
use crate::sync::SyncMessage;

/// 消费者管理器 - 管理多个消费者
pub struct ConsumerManager {
    /// 广播发送器
    broadcaster: broadcast::Sender<SyncMessage>,
    /// 消费者列表
    consumers: Vec<Box<dyn Consumer>>,
}

impl ConsumerManager {
    /// 创建新的消费者管理器
    pub fn new() -> Self {
        Self::with_config(&ConsumerConfig::default())
    }

    /// 根据配置创建消费者管理器
    pub fn with_config(config: &ConsumerConfig) -> Self {
        let (broadcaster, _) = broadcast::channel(config.channel_capacity.max(1));
        let mut manager = Self {
            broadcaster,
            consumers: Vec::new(),
        };

        // 根据配置添加消费者
        if config.enable_log_consumer {
            manager.add_consumer(Box::new(LogConsumer));
        }
        if config.enable_console_consumer {
            manager.add_consumer(Box::new(ConsoleConsumer::default()));
        }

        manager
    }

    /// 添加消费者
    pub fn add_consumer(&mut self, consumer: Box<dyn Consumer>) {
        log::debug!("Registered consumer: {}", consumer.name());
        self.consumers.push(consumer);
    }

    /// 启动所有消费者
    pub async fn start_consumers(&mut self) -> Result<Vec<tokio::task::JoinHandle<Result<()>>>> {
        let mut handles = Vec::new();

        for consumer in &mut self.consumers {
            let receiver = self.broadcaster.subscribe();
            let consumer_handle = consumer.start(receiver).await?;
            handles.push(consumer_handle);
        }

        Ok(handles)
    }

    /// 获取广播发送器
    pub fn get_broadcaster(&self) -> broadcast::Sender<SyncMessage> {
        self.broadcaster.clone()
    }

    /// 获取消费者数量
    pub fn get_consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// 广播消息到所有消费者
    pub fn broadcast(&self, message: SyncMessage) -> Result<()> {
        self.broadcaster.send(message).map_err(|e| {
            utils::error::Error::with_source("Failed to broadcast message", Box::new(e))
        })?;
        Ok(())
    }

    /// 关闭所有消费者
    pub async fn shutdown(&self) -> Result<()> {
        // 忽略错误（消费者可能已经退出）
        let _ = self.broadcaster.send(SyncMessage::Shutdown);
        Ok(())
    }
}

impl Default for ConsumerManager {
    fn default() -> Self {
        Self::new()
    }
}
