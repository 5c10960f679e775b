use crate::consumer::Consumer;
use crate::sync::SyncMessage;
use tokio::sync::broadcast;
use utils::error::Result;

/// 日志消费者 - 将同步事件记录到日志
pub struct LogConsumer;

#[async_trait::async_trait]
impl Consumer for LogConsumer {
    async fn start(
        &mut self, mut receiver: broadcast::Receiver<SyncMessage>,
    ) -> Result<tokio::task::JoinHandle<Result<()>>> {
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(SyncMessage::Started {
                        source,
                        destination,
                    }) => {
                        log::info!("[LogConsumer] Sync started: {} -> {}", source, destination);
                    }
                    Ok(SyncMessage::Planned { copy, skip }) => {
                        log::info!("[LogConsumer] Planned {} copies, {} skips", copy, skip);
                    }
                    Ok(SyncMessage::Transferred { path, bytes }) => {
                        log::info!("[LogConsumer] Copied {} ({} bytes)", path, bytes);
                    }
                    Ok(SyncMessage::Skipped { path, reason }) => {
                        log::debug!("[LogConsumer] Skipped {}: {}", path, reason);
                    }
                    Ok(SyncMessage::Failed { path, failure }) => {
                        log::warn!("[LogConsumer] Failed {}: {}", path, failure);
                    }
                    Ok(SyncMessage::Complete(result)) => {
                        log::info!("[LogConsumer] Sync completed: {}", result);
                        break;
                    }
                    Ok(SyncMessage::Shutdown) => {
                        log::info!("[LogConsumer] Shutdown requested");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        log::warn!("[LogConsumer] Channel closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        log::warn!("[LogConsumer] Channel lagged, skipping messages");
                        continue;
                    }
                }
            }
            Ok(())
        });

        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "log_consumer"
    }
}
