use crate::consumer::stats::{format_bytes, SyncStats};
use crate::consumer::Consumer;
use crate::sync::SyncMessage;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use utils::error::Result;

/// 控制台消费者 - 输出同步进度和最终统计信息
pub struct ConsoleConsumer {
    progress_interval: Duration,
}

impl ConsoleConsumer {
    pub fn new(progress_interval: Duration) -> Self {
        Self { progress_interval }
    }
}

impl Default for ConsoleConsumer {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait::async_trait]
impl Consumer for ConsoleConsumer {
    async fn start(
        &mut self, mut receiver: broadcast::Receiver<SyncMessage>,
    ) -> Result<tokio::task::JoinHandle<Result<()>>> {
        let progress_interval = self.progress_interval;
        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let mut stats = SyncStats {
                log_path: SyncStats::build_log_path(),
                ..Default::default()
            };
            let mut last_progress_time = Instant::now();

            println!("🚀 datasync {}\n", env!("CARGO_PKG_VERSION"));

            loop {
                match receiver.recv().await {
                    Ok(SyncMessage::Started {
                        source,
                        destination,
                    }) => {
                        println!("Syncing {} -> {}", source, destination);
                        stats.source = source;
                        stats.destination = destination;
                    }
                    Ok(SyncMessage::Planned { copy, skip }) => {
                        println!("Planned: {} to copy, {} up to date", copy, skip);
                        stats.planned_copies = copy;
                        stats.planned_skips = skip;
                    }
                    Ok(SyncMessage::Transferred { path, bytes }) => {
                        stats.copied += 1;
                        stats.total_bytes += bytes;
                        log::debug!("[ConsoleConsumer] Copied: {}", path);
                    }
                    Ok(SyncMessage::Skipped { .. }) => {
                        stats.skipped += 1;
                    }
                    Ok(SyncMessage::Failed { path, failure }) => {
                        stats.failed += 1;
                        println!("  ✗ {}: {}", path, failure);
                    }
                    Ok(SyncMessage::Complete(result)) => {
                        log::info!("[ConsoleConsumer] Sync completed");

                        stats.apply_result(&result);
                        let duration = start_time.elapsed();
                        stats.total_time = format!("{:.2}s", duration.as_secs_f64());

                        // 打印最终统计信息
                        println!("\n{}", stats);
                        break;
                    }
                    Ok(SyncMessage::Shutdown) => {
                        log::info!("[ConsoleConsumer] Shutdown requested");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        log::warn!("[ConsoleConsumer] Channel closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        log::warn!("[ConsoleConsumer] Channel lagged, skipping messages");
                        continue;
                    }
                }

                // 定期打印进度
                if last_progress_time.elapsed() >= progress_interval {
                    let now = chrono::Local::now();
                    println!(
                        "[{}] Sync progress: {}/{} files, {} transferred",
                        now.format("%Y-%m-%d %H:%M:%S"),
                        stats.processed(),
                        stats.planned_copies + stats.planned_skips,
                        format_bytes(stats.total_bytes as f64)
                    );
                    last_progress_time = Instant::now();
                }
            }
            Ok(())
        });

        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "console_consumer"
    }
}
