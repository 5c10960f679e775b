use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, watch, Mutex};

use storage::{StorageError, StorageProvider};
use utils::app_config::SyncConfig;

use crate::sync::planner::{SyncPlan, TransferAction};
use crate::sync::result::{SyncResult, TransferFailure};
use crate::sync::scratch::ScratchSpace;
use crate::sync::SyncMessage;

/// 执行器参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// 同时进行的传输数量，至少为1
    pub concurrency: usize,
    /// 可重试错误的最大重试次数，0表示不重试
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_retries: 0,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl From<&SyncConfig> for ExecutorSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Carries out a [`SyncPlan`] against a connected pair of providers.
///
/// Every copy task ends up in exactly one of `succeeded` or `failed`; a
/// failing file never stops the remaining tasks.
pub struct SyncExecutor {
    settings: ExecutorSettings,
    scratch: Arc<ScratchSpace>,
    shutdown: Option<watch::Receiver<bool>>,
    events: Option<broadcast::Sender<SyncMessage>>,
}

impl SyncExecutor {
    pub fn new(scratch: ScratchSpace) -> Self {
        Self {
            settings: ExecutorSettings::default(),
            scratch: Arc::new(scratch),
            shutdown: None,
            events: None,
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 关闭信号为true后，尚未开始的传输记为取消
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<SyncMessage>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    pub async fn execute(
        &self, plan: &SyncPlan, source: Arc<dyn StorageProvider>,
        destination: Arc<dyn StorageProvider>,
    ) -> SyncResult {
        let mut result = SyncResult::default();
        let mut copies = Vec::new();

        for task in plan.tasks() {
            match task.action {
                TransferAction::Skip => {
                    log::debug!("Skipping {}: {}", task.path, task.reason);
                    result.record_skip(&task.path);
                    emit(
                        &self.events,
                        SyncMessage::Skipped {
                            path: task.path.clone(),
                            reason: task.reason.clone(),
                        },
                    );
                }
                TransferAction::Copy => copies.push(task.path.clone()),
            }
        }

        if copies.is_empty() {
            return result;
        }

        let worker = TransferWorker {
            source,
            destination,
            scratch: self.scratch.clone(),
            settings: self.settings.clone(),
            shutdown: self.shutdown.clone(),
            events: self.events.clone(),
        };
        let queue = Arc::new(TaskQueue::new(copies));
        let aggregate = Arc::new(Mutex::new(result));
        let workers = self.settings.concurrency.clamp(1, queue.len());

        log::info!(
            "Transferring {} files with {} worker(s)",
            queue.len(),
            workers
        );

        if workers == 1 {
            worker.drain(&queue, &aggregate).await;
        } else {
            let mut handles = Vec::with_capacity(workers);
            for id in 0..workers {
                let worker = worker.clone();
                let queue = queue.clone();
                let aggregate = aggregate.clone();
                handles.push(tokio::spawn(async move {
                    log::debug!("Transfer worker {} started", id);
                    worker.drain(&queue, &aggregate).await;
                }));
            }
            for (id, handle) in handles.into_iter().enumerate() {
                if let Err(e) = handle.await {
                    log::error!("Transfer worker {} aborted: {}", id, e);
                }
            }
        }

        let mut result = match Arc::try_unwrap(aggregate) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        };

        // 工作任务异常退出时，其处理中的文件仍需有结果
        for path in queue.paths() {
            if !result.is_settled(path) {
                let err = StorageError::TransferError(format!("transfer of {} was aborted", path));
                result.record_failure(path, TransferFailure::from(&err));
            }
        }

        log::info!("Transfer finished: {}", result);
        result
    }
}

fn emit(events: &Option<broadcast::Sender<SyncMessage>>, message: SyncMessage) {
    if let Some(tx) = events {
        // 没有订阅者时发送失败，忽略
        let _ = tx.send(message);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// 按顺序分发待复制路径
struct TaskQueue {
    paths: Vec<String>,
    next: AtomicUsize,
}

impl TaskQueue {
    fn new(paths: Vec<String>) -> Self {
        Self {
            paths,
            next: AtomicUsize::new(0),
        }
    }

    fn len(&self) -> usize {
        self.paths.len()
    }

    fn next(&self) -> Option<&str> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.paths.get(index).map(String::as_str)
    }

    fn paths(&self) -> &[String] {
        &self.paths
    }
}

#[derive(Clone)]
struct TransferWorker {
    source: Arc<dyn StorageProvider>,
    destination: Arc<dyn StorageProvider>,
    scratch: Arc<ScratchSpace>,
    settings: ExecutorSettings,
    shutdown: Option<watch::Receiver<bool>>,
    events: Option<broadcast::Sender<SyncMessage>>,
}

impl TransferWorker {
    async fn drain(&self, queue: &TaskQueue, aggregate: &Mutex<SyncResult>) {
        while let Some(path) = queue.next() {
            let outcome = if self.is_cancelled() {
                Err(StorageError::Cancelled(
                    "shutdown requested before transfer started".to_string(),
                ))
            } else {
                // 单个文件的panic只影响该文件，与并发度无关
                AssertUnwindSafe(self.transfer_with_retry(path))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(StorageError::TransferError(format!(
                            "transfer of {} panicked: {}",
                            path,
                            panic_message(panic.as_ref())
                        )))
                    })
            };

            match outcome {
                Ok(bytes) => {
                    log::info!("Synced {} ({} bytes)", path, bytes);
                    aggregate.lock().await.record_success(path, bytes);
                    emit(
                        &self.events,
                        SyncMessage::Transferred {
                            path: path.to_string(),
                            bytes,
                        },
                    );
                }
                Err(e) => {
                    log::warn!("Failed to sync {}: {}", path, e);
                    let failure = TransferFailure::from(&e);
                    aggregate.lock().await.record_failure(path, failure.clone());
                    emit(
                        &self.events,
                        SyncMessage::Failed {
                            path: path.to_string(),
                            failure,
                        },
                    );
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn transfer_with_retry(&self, path: &str) -> storage::Result<u64> {
        let mut attempt = 0;
        loop {
            match self.transfer(path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e)
                    if e.is_retryable()
                        && attempt < self.settings.max_retries
                        && !self.is_cancelled() =>
                {
                    attempt += 1;
                    log::warn!(
                        "Retrying {} ({}/{}) after error: {}",
                        path,
                        attempt,
                        self.settings.max_retries,
                        e
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 先完整读入中转文件，再写入目标端
    async fn transfer(&self, path: &str) -> storage::Result<u64> {
        let mut scratch = self.scratch.acquire().map_err(|e| {
            StorageError::TransferError(format!("cannot allocate scratch for {}: {}", path, e))
        })?;

        let mut reader = self.source.read(path).await?;
        scratch.fill(&mut reader).await.map_err(|e| {
            StorageError::TransferError(format!("reading {} from source: {}", path, e))
        })?;
        drop(reader);

        let staged = scratch.reader().await.map_err(|e| {
            StorageError::TransferError(format!("reopening scratch for {}: {}", path, e))
        })?;
        self.destination.write(path, staged).await
    }
}
